//
// m6502emu.rs --- Emulator tool entry point.
//
// Released under the "BSD3" license. See the file "LICENSE"
// for details.
//

use std::env;
use std::fs;
use std::process::exit;

use getopts::Options;
use tracing_subscriber::EnvFilter;

use m6502::emu::{Clock, Result, CPU};

fn print_usage(opts: &Options) {
    let brief = "Usage: m6502emu [OPTIONS...] FILE...";
    print!("{}", opts.usage(brief));
}

/// Parse and validate command line options, returning the `Matches`
/// object containing option information.
fn parse_options() -> getopts::Matches {
    let args: Vec<String> = env::args().collect();
    let mut opts = Options::new();

    opts.optopt("b", "base", "image load address in hex (default: 0600)", "ADDR");
    opts.optopt("e", "entry", "entry point address in hex (default: load address)", "ADDR");
    opts.optopt("u", "until", "run until this PC instead of until halt", "ADDR");
    opts.optopt("t", "tick", "clock tick duration in milliseconds (default: 0)", "MS");
    opts.optopt("d", "dump", "dump a memory range after the run", "START:END");
    opts.optflag("", "hex", "treat input files as Intel HEX images");
    opts.optflag("", "help", "display this help and exit");
    opts.optflag("", "version", "output version information and exit");

    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => {
            println!("m6502emu: {}\n", f);
            print_usage(&opts);
            exit(1);
        }
    };

    if matches.opt_present("help") {
        print_usage(&opts);
        exit(0);
    }

    if matches.opt_present("version") {
        println!("{}", env!("CARGO_PKG_VERSION"));
        exit(0);
    }

    if matches.free.is_empty() {
        println!("m6502emu: no input files\n");
        print_usage(&opts);
        exit(1);
    }

    matches
}

fn run() -> Result<()> {
    let matches = parse_options();

    let base = match matches.opt_str("b") {
        Some(arg) => u16::from_str_radix(&arg, 16)?,
        None => 0x0600,
    };

    let tick = match matches.opt_str("t") {
        Some(arg) => arg.parse::<u64>()?,
        None => 0,
    };

    let mut cpu = CPU::with_clock(Clock::new(tick));

    for infile in &matches.free {
        if matches.opt_present("hex") {
            cpu.mem.load_ihex_file(infile)?;
        } else {
            let image = fs::read(infile)?;
            cpu.mem.load_bytes(&image, base);
        }
    }

    cpu.regs.pc = match matches.opt_str("e") {
        Some(arg) => u16::from_str_radix(&arg, 16)?,
        None => base,
    };
    cpu.regs.sp = 0xFF;

    match matches.opt_str("u") {
        Some(arg) => {
            let stop = u16::from_str_radix(&arg, 16)?;
            cpu.run_until(stop);
        }
        None => cpu.run(),
    }

    println!("{} {}", cpu.regs, cpu.flags);

    if let Some(arg) = matches.opt_str("d") {
        if let Some((start, end)) = arg.split_once(':') {
            let start = u16::from_str_radix(start, 16)?;
            let end = u16::from_str_radix(end, 16)?;
            println!("{}", cpu.mem.dump(start, end, 16));
        }
    }

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(_) => (),
        Err(err) => {
            println!("m6502emu: {}", err);
            exit(1);
        }
    }
}
