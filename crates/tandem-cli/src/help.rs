// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Help text for CLI commands.

use crate::output;

pub fn print_usage() {
    println!(
        "{} {} - coordination primitives, exercised",
        output::title("Tandem"),
        output::version(env!("CARGO_PKG_VERSION"))
    );
    println!();
    println!(
        "{}: {} {} {}",
        output::section_header("Usage"),
        output::command("tandem"),
        output::arg("<scenario>"),
        output::arg("[--config <file>]")
    );
    println!();
    println!("{}", output::section_header("Scenarios:"));
    println!(
        "  {}     N workers x K increments on a mutex-guarded counter",
        output::command("counter")
    );
    println!(
        "  {}        Deposits and balance reads on a read/write-locked account",
        output::command("bank")
    );
    println!(
        "  {}    Fill a buffered channel, overflow into a parked sender, drain",
        output::command("buffered")
    );
    println!(
        "  {}       Producer closes a rendezvous channel, consumer ranges over it",
        output::command("range")
    );
    println!(
        "  {}      Collect from two channels with a blocking select",
        output::command("select")
    );
    println!("  {}   Join workers with a wait group", output::command("waitgroup"));
    println!("  {}         Run every scenario", output::command("all"));
    println!();
    println!("{}", output::section_header("Other:"));
    println!("  {}        Show this help", output::command("help"));
    println!("  {}     Show version", output::command("version"));
    println!();
    println!("{}", output::section_header("Environment:"));
    println!("  {}  JSON config file (same as --config)", output::arg("TANDEM_CONFIG"));
    println!("  {}     Tracing filter, e.g. tandem_sync=debug", output::arg("TANDEM_LOG"));
    println!(
        "  {} {} {} {}",
        output::arg("TANDEM_WORKERS"),
        output::arg("TANDEM_INCREMENTS"),
        output::arg("TANDEM_CAPACITY"),
        output::arg("TANDEM_MESSAGES")
    );
}
