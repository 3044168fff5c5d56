use std::path::Path;
use std::process::{exit, Command, ExitStatus};

use clap::{Parser, Subcommand, ValueEnum};

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the Sentinel-2 tile bot workspace",
    long_about = "A unified CLI for dry runs, benchmarks, live network tests,\n\
                  and CI checks in the Sentinel-2 tile bot workspace."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot once without publishing, using the sample whitelist
    Run {
        /// Extra arguments passed through to s2-bot
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Run Criterion benchmarks
    Bench,
    /// Compare benchmarks: stash changes, create baseline, restore, compare
    BenchCompare,
    /// Run CI checks (fmt, clippy, tests, raster build, benchmarks)
    Ci {
        /// Job to run
        #[arg(value_enum, default_value_t = CiJob::Check)]
        job: CiJob,
    },
    /// Run tests that talk to the public catalog and geocoder (ignored by default)
    LiveTest,
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// Formatting, clippy, and tests
    Check,
    /// Build with GDAL-backed band decoding
    Raster,
    /// Run benchmarks
    Bench,
    /// Run check + raster + bench
    All,
}

const SAMPLE_WHITELIST: &str = "data/valid_mgrs.sample";

// ── helpers ────────────────────────────────────────────────────────

fn step(label: &str) {
    eprintln!("\n=== {label} ===");
}

fn cargo(args: &[&str]) -> ExitStatus {
    eprintln!("+ cargo {}", args.join(" "));
    Command::new("cargo")
        .args(args)
        .status()
        .expect("failed to execute cargo")
}

fn git(args: &[&str]) -> ExitStatus {
    eprintln!("+ git {}", args.join(" "));
    Command::new("git")
        .args(args)
        .status()
        .expect("failed to execute git")
}

fn run_cargo(args: &[&str]) {
    let status = cargo(args);
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}

fn run_git(args: &[&str]) {
    let status = git(args);
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}

fn bench_args<'a>(extra: &[&'a str]) -> Vec<&'a str> {
    let mut args = vec!["bench", "--package", "s2_core", "--bench", "composite"];
    if !extra.is_empty() {
        args.push("--");
        args.extend_from_slice(extra);
    }
    args
}

// ── CI jobs ────────────────────────────────────────────────────────

fn ci_check() {
    step("Check formatting");
    run_cargo(&["fmt", "--all", "--", "--check"]);

    step("Clippy");
    run_cargo(&["clippy", "--all-targets", "--", "-D", "warnings"]);

    step("Test s2_core");
    run_cargo(&["test", "-p", "s2_core"]);

    step("Test s2_core without network clients");
    run_cargo(&[
        "test",
        "-p",
        "s2_core",
        "--no-default-features",
        "--features",
        "test-helpers",
    ]);

    step("Test s2_bot");
    run_cargo(&["test", "-p", "s2_bot"]);
}

fn ci_raster() {
    step("Build with raster support (needs GDAL)");
    run_cargo(&["build", "-p", "s2_bot", "--features", "raster"]);
}

fn ci_bench() {
    step("Run benchmarks");
    run_cargo(&bench_args(&[]));
}

// ── main ───────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { args } => {
            let mut cargo_args = vec![
                "run",
                "-p",
                "s2_bot",
                "--release",
                "--features",
                "raster",
                "--",
                "--whitelist",
                SAMPLE_WHITELIST,
            ];
            cargo_args.extend(args.iter().map(String::as_str));
            run_cargo(&cargo_args);
        }
        Commands::Bench => {
            run_cargo(&bench_args(&[]));
        }
        Commands::BenchCompare => {
            let baseline_dir = Path::new("target/criterion");
            if baseline_dir.exists() {
                step("Removing existing benchmark data");
                std::fs::remove_dir_all(baseline_dir).expect("failed to remove target/criterion");
            }

            step("Stashing current changes");
            run_git(&[
                "stash",
                "push",
                "-m",
                "Temporary stash for benchmark comparison",
            ]);

            step("Running benchmark to create baseline");
            run_cargo(&bench_args(&["--save-baseline", "main"]));

            step("Reapplying changes");
            run_git(&["stash", "pop"]);

            step("Running benchmark comparing against baseline");
            run_cargo(&bench_args(&["--baseline", "main"]));

            eprintln!("\nDone! Check the output above to see performance comparison.");
        }
        Commands::Ci { job } => {
            match job {
                CiJob::Check => ci_check(),
                CiJob::Raster => ci_raster(),
                CiJob::Bench => ci_bench(),
                CiJob::All => {
                    ci_check();
                    ci_raster();
                    ci_bench();
                }
            }
            eprintln!("\nCI job passed.");
        }
        Commands::LiveTest => {
            run_cargo(&["test", "-p", "s2_core", "--", "--ignored"]);
        }
    }
}
