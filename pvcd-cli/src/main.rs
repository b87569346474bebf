// Copyright 2024-2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use clap::Parser;
use indicatif::ProgressStyle;
use pvcd::*;
use std::error::Error;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

#[derive(Parser, Debug)]
#[command(name = "pvcd")]
#[command(author = "Kevin Laeufer <laeufer@berkeley.edu>")]
#[command(version)]
#[command(about = "Parses a VCD file and prints its scope tree and diagnostics.", long_about = None)]
struct Args {
    #[arg(value_name = "VCDFILE", index = 1)]
    filename: String,
    #[arg(long, default_value = "auto", help = "text encoding: auto, utf8 or latin1")]
    encoding: Encoding,
    #[arg(long, help = "only run the lexer and print the tokens")]
    lex_only: bool,
    #[arg(long, help = "replace a single top level `SystemC` scope by its children")]
    strip_systemc_root: bool,
    #[arg(long, help = "show a progress bar while parsing")]
    progress: bool,
    #[arg(short, long, help = "print debug messages")]
    verbose: bool,
}

fn print_scope(scope: &Scope, indent: usize) {
    for (key, node) in scope.entries() {
        match node {
            Node::Scope(child) => {
                println!("{:indent$}{key} ({})", "", child.scope_type);
                print_scope(child, indent + 2);
            }
            Node::Signal(signal) => {
                let last = signal
                    .series
                    .iter()
                    .last()
                    .map(|(t, v)| format!(", last: {v} @ {t}"))
                    .unwrap_or_default();
                println!(
                    "{:indent$}{key}: {} {} `{}`, {} changes{last}",
                    "",
                    signal.decl.var_type,
                    signal.decl.size,
                    signal.decl.id_code,
                    signal.series.len()
                );
            }
        }
    }
}

fn print_document(doc: &Document) {
    let info = &doc.info;
    if let Some(version) = &info.version {
        println!("version:   {version}");
    }
    if let Some(date) = &info.date {
        println!("date:      {date}");
    }
    if let Some(timescale) = &info.timescale {
        match doc.timescale_factor_seconds() {
            Some(seconds) => println!("timescale: {timescale} ({seconds:e} s)"),
            None => println!("timescale: {timescale}"),
        }
    }
    for comment in info.comment.iter() {
        println!("comment:   {comment}");
    }
    print_scope(&doc.data, 0);
}

fn lex_only(args: &Args) -> Result<()> {
    let mmap = input::map_file(&args.filename)?;
    let text = input::prepare(&mmap[..], args.encoding, true)?;
    let (tokens, diagnostics) = simple::lex_str(&text);
    for token in tokens.iter().filter(|t| t.kind != TokenKind::Space) {
        println!("{token}");
    }
    for diagnostic in diagnostics.iter() {
        eprintln!("{diagnostic}");
    }
    Ok(())
}

/// Includes the file name and every underlying cause, e.g., the OS error.
fn error_message(filename: &str, e: &PvcdError) -> String {
    let mut msg = format!("{filename}: {e}");
    let mut source = e.source();
    while let Some(cause) = source {
        msg.push_str(&format!(": {cause}"));
        source = cause.source();
    }
    msg
}

/// Spawns a thread that draws a progress bar until `done` is set.
fn spawn_progress_bar(
    len: u64,
    progress: ProgressCount,
    done: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    let ten_millis = std::time::Duration::from_millis(10);
    thread::spawn(move || {
        let bar = indicatif::ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::with_template(
            "[{elapsed_precise}] {bar:40.cyan/blue} {decimal_bytes} ({percent_precise}%)",
        ) {
            bar.set_style(style);
        }
        loop {
            bar.set_position(progress.load(Ordering::SeqCst));
            thread::sleep(ten_millis);
            if done.load(Ordering::SeqCst) {
                bar.finish_and_clear();
                break;
            }
        }
    })
}

fn main() -> ExitCode {
    let args = Args::parse();
    // diagnostics are printed below, so the log stays quiet unless asked for
    let level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Off
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    if args.lex_only {
        return match lex_only(&args) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("{}", error_message(&args.filename, &e));
                ExitCode::FAILURE
            }
        };
    }

    let options = ParseOptions {
        encoding: args.encoding,
        strip_systemc_root: args.strip_systemc_root,
        ..Default::default()
    };

    let start = std::time::Instant::now();
    let result = if args.progress {
        let len = std::fs::metadata(&args.filename)
            .map(|m| m.len())
            .unwrap_or(0);
        let progress = Arc::new(AtomicU64::new(0));
        let done = Arc::new(AtomicBool::new(false));
        let bar = spawn_progress_bar(len, progress.clone(), done.clone());
        let result = simple::read_with_progress(&args.filename, &options, Some(progress));
        done.store(true, Ordering::SeqCst);
        if bar.join().is_err() {
            log::warn!("progress bar thread panicked");
        }
        result
    } else {
        simple::read_with_options(&args.filename, &options)
    };
    log::debug!("parsing {} took {:?}", args.filename, start.elapsed());

    let doc = match result {
        Ok(doc) => doc,
        Err(e) => {
            eprintln!("{}", error_message(&args.filename, &e));
            return ExitCode::FAILURE;
        }
    };

    print_document(&doc);
    for diagnostic in doc.diagnostics.iter() {
        eprintln!("{diagnostic}");
    }
    if doc.complete {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_includes_cause() {
        let e = PvcdError::from(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "No such file or directory",
        ));
        assert_eq!(
            error_message("missing.vcd", &e),
            "missing.vcd: [vcd] io error: No such file or directory"
        );
    }
}
