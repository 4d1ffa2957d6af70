use std::{env, fs, path::Path, process};

use wick::bytecode::disasm::print_bc;
use wick::bytecode::emit::Emitter;
use wick::frontend::lexer::Lexer;
use wick::frontend::parser::parse_source;
use wick::frontend::token_dumper::TokenDumper;
use wick::runtime::vm::Vm;

fn main() {
    let args: Vec<String> = env::args().collect();

    let tokens_only = args.contains(&"--tokens".to_string());
    let no_color = args.contains(&"--no-color".to_string());
    let ast = args.contains(&"--ast".to_string());
    let bytecode = args.contains(&"--bc".to_string()) || args.contains(&"--bytecode".to_string());

    // first non-flag argument is the filename
    let filename = args.iter().skip(1).find(|a| !a.starts_with('-'));

    let filename = match filename {
        Some(filename) => filename,
        None => {
            print_usage();
            process::exit(if args.len() == 1 { 0 } else { 2 });
        }
    };

    let source = match fs::read_to_string(filename) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Failed to read '{}': {}", filename, e);
            process::exit(1);
        }
    };

    if tokens_only {
        dump_tokens(&source, filename, no_color);
        return;
    }

    run_program(&source, filename, ast, bytecode);
}

fn print_usage() {
    println!("wick - a small imperative scripting language");
    println!();
    println!("Usage:");
    println!("  wick <file.wick>            Run a program");
    println!("  wick --tokens <file.wick>   Show the token stream");
    println!("  wick --no-color --tokens    Token stream without ANSI colors");
    println!("  wick --ast <file.wick>      Show the parsed program");
    println!("  wick --bc <file.wick>       Show the compiled bytecode");
}

fn dump_tokens(source: &str, filename: &str, no_color: bool) {
    let mut lexer = Lexer::new(source, Path::new(filename).to_path_buf());
    let tokens = lexer.tokenize();

    let mut dumper = TokenDumper::new();
    if no_color {
        dumper = dumper.no_color();
    }
    dumper.dump(&tokens);
}

fn run_program(source: &str, filename: &str, ast: bool, bytecode: bool) {
    let program = match parse_source(source, Path::new(filename)) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("Parse error: {}", e);
            process::exit(2);
        }
    };

    if ast {
        println!("{:#?}", program);
        return;
    }

    let module = match Emitter::new().emit(&program) {
        Ok(module) => module,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(2);
        }
    };

    if bytecode {
        print_bc(&module);
        return;
    }

    let mut vm = Vm::new();
    if let Err(e) = vm.run(&module) {
        eprintln!("{}", e);
        process::exit(2);
    }
}
