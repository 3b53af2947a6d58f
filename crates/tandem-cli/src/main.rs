// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Tandem CLI - runs the coordination scenarios.

mod config;
mod help;
mod logging;
mod output;
mod scenarios;

use std::env;
use std::path::PathBuf;
use std::process;

use config::DemoConfig;

fn main() {
    output::init();
    logging::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let (positional, config_path) = match split_args(&args) {
        Ok(parts) => parts,
        Err(msg) => {
            eprintln!("{}: {}", output::error_label(), msg);
            process::exit(1);
        }
    };

    let Some(command) = positional.first() else {
        help::print_usage();
        return;
    };

    match command.as_str() {
        "help" | "--help" | "-h" => help::print_usage(),
        "version" | "--version" | "-V" => {
            println!("tandem {}", output::value(env!("CARGO_PKG_VERSION")));
        }
        "all" => run_scenarios(&scenarios::NAMES, config_path),
        name if scenarios::NAMES.contains(&name) => run_scenarios(&[name], config_path),
        other => {
            eprintln!("{}: unknown scenario: {}", output::error_label(), other);
            help::print_usage();
            process::exit(1);
        }
    }
}

/// Pull `--config <file>` out of the argument list.
fn split_args(args: &[String]) -> Result<(Vec<String>, Option<PathBuf>), String> {
    let mut positional = Vec::new();
    let mut config = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            match iter.next() {
                Some(path) => config = Some(PathBuf::from(path)),
                None => return Err("--config needs a file path".to_string()),
            }
        } else if let Some(path) = arg.strip_prefix("--config=") {
            config = Some(PathBuf::from(path));
        } else {
            positional.push(arg.clone());
        }
    }
    Ok((positional, config))
}

fn run_scenarios(names: &[&str], config_path: Option<PathBuf>) {
    let config = match DemoConfig::load(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {}", output::error_label(), e);
            process::exit(1);
        }
    };

    let mut failed = 0;
    for name in names {
        let Some(result) = scenarios::run(name, &config) else {
            continue;
        };
        match result {
            Ok(report) => {
                for line in &report.lines {
                    let status = if report.ok {
                        output::status_pass()
                    } else {
                        output::status_fail()
                    };
                    println!("  {} {}", status, line);
                }
                if report.ok {
                    println!("{}", output::banner_ok(report.name));
                } else {
                    failed += 1;
                    println!("{}", output::banner_fail(report.name));
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("{}: {}: {}", output::error_label(), name, e);
                println!("{}", output::banner_fail(name));
            }
        }
    }

    if failed > 0 {
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn split_config_flag() {
        let (pos, cfg) = split_args(&strings(&["counter", "--config", "c.json"])).unwrap();
        assert_eq!(pos, vec!["counter"]);
        assert_eq!(cfg, Some(PathBuf::from("c.json")));
    }

    #[test]
    fn split_config_equals() {
        let (_, cfg) = split_args(&strings(&["--config=x.json", "all"])).unwrap();
        assert_eq!(cfg, Some(PathBuf::from("x.json")));
    }

    #[test]
    fn missing_config_path() {
        assert!(split_args(&strings(&["--config"])).is_err());
    }
}
