//! BLAKE2B hashing helper: `provenance-b2sum <path> [digest_size_bytes]`.
//!
//! Prints `<hex digest>  <path>` in the style of `b2sum`. Exit status 2 means
//! bad usage, 1 means the file could not be read.

use anyhow::{anyhow, Context};
use blake2::digest::{Update, VariableOutput};
use blake2::Blake2bVar;
use std::env;
use std::fs::File;
use std::io::{BufReader, Read};
use std::process;

const READ_CHUNK_SIZE: usize = 64 * 1024;
const DEFAULT_DIGEST_SIZE: usize = 64;

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    let (path, size) = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("provenance-b2sum: {}", e);
            eprintln!("usage: provenance-b2sum <path> [digest_size_bytes]");
            process::exit(2);
        }
    };

    match digest_file(path, size) {
        Ok(digest) => println!("{}  {}", digest, path),
        Err(e) => {
            eprintln!("provenance-b2sum: {:#}", e);
            process::exit(1);
        }
    }
}

fn parse_args(args: &[String]) -> anyhow::Result<(&str, usize)> {
    let (path, size) = match args {
        [path] => (path, DEFAULT_DIGEST_SIZE),
        [path, size] => {
            let size: usize = size
                .parse()
                .map_err(|_| anyhow!("digest size '{}' is not a number", size))?;
            (path, size)
        }
        _ => return Err(anyhow!("expected 1 or 2 arguments, got {}", args.len())),
    };
    if !(1..=DEFAULT_DIGEST_SIZE).contains(&size) {
        return Err(anyhow!("digest size must be 1..={} bytes", DEFAULT_DIGEST_SIZE));
    }
    Ok((path.as_str(), size))
}

fn digest_file(path: &str, size: usize) -> anyhow::Result<String> {
    let file = File::open(path).with_context(|| format!("opening {}", path))?;
    let mut reader = BufReader::with_capacity(READ_CHUNK_SIZE, file);
    let mut hasher = Blake2bVar::new(size).map_err(|e| anyhow!("{}", e))?;

    let mut buffer = vec![0u8; READ_CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buffer).with_context(|| format!("reading {}", path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    let mut out = vec![0u8; size];
    hasher
        .finalize_variable(&mut out)
        .map_err(|e| anyhow!("{}", e))?;
    Ok(hex::encode(out))
}
