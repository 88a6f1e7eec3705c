use std::fs;
use std::io::{self, Read};

use anyhow::Context;
use clap::{App, Arg};

use ember::Driver;

fn main() -> anyhow::Result<()> {
    let matches = App::new("ember")
        .about("compiler front end for the ember toy expression language")
        .arg(
            Arg::with_name("FILE")
                .help("source file to compile (reads stdin when omitted)")
                .index(1),
        )
        .arg(
            Arg::with_name("eval")
                .short("e")
                .long("eval")
                .takes_value(true)
                .value_name("SOURCE")
                .help("compile the given source string instead of a file"),
        )
        .get_matches();

    let source = if let Some(source) = matches.value_of("eval") {
        source.to_string()
    } else if let Some(path) = matches.value_of("FILE") {
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?
    } else {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read stdin")?;
        buffer
    };

    let mut driver = Driver::new("main", io::stderr());
    driver.run(&source)?;

    print!("{}", driver.finish());
    Ok(())
}
