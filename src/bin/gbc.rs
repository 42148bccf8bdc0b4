//! the compiler CLI. takes one or more General Basic source files and
//! writes URCL to `-o` (`main.urcl` by default).
//!
//! flags aren't a fixed set: any `-flag` token consumes the following
//! non-flag token as its value, mirroring `gb.py` exactly rather than a
//! `clap` derive struct (see DESIGN.md).

use std::collections::HashMap;
use std::fs::File;
use std::process::ExitCode;

use gbc::common::Result;
use gbc::driver::{Driver, FileSourceReader};

fn parse_args(argv: &[String]) -> (HashMap<String, String>, Vec<String>) {
    let mut args = HashMap::new();
    args.insert("-o".to_string(), "main.urcl".to_string());
    let mut inputs = Vec::new();
    let mut flag = String::new();
    for arg in argv {
        if let Some(stripped) = arg.strip_prefix('-') {
            let _ = stripped;
            flag = arg.clone();
        } else if flag.is_empty() {
            inputs.push(arg.clone());
        } else {
            args.insert(flag.clone(), arg.clone());
            flag.clear();
        }
    }
    (args, inputs)
}

fn run() -> Result<()> {
    env_logger::init();
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let (args, inputs) = parse_args(&argv);

    if inputs.is_empty() {
        return Err(gbc::common::CompileError::Io("No input files specified.".to_string()));
    }

    let mut sources = Vec::with_capacity(inputs.len());
    for input in &inputs {
        sources.push(Box::new(FileSourceReader::new(input)?) as Box<dyn gbc::driver::SourceReader>);
    }

    let driver = Driver::new(sources);
    let output_path = &args["-o"];
    let mut output = File::create(output_path)?;
    driver.compile(&mut output)
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
