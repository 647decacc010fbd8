use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};

use mobi_runner::parser::yaml::Suite;
use mobi_runner::utils::config::FrameworkConfig;
use mobi_runner::{driver, report, runner};

#[derive(Parser)]
#[command(name = "mobi-runner")]
#[command(version)]
#[command(about = "YAML-driven mobile UI test runner", long_about = None)]
struct Cli {
    /// Framework configuration file
    #[arg(short, long, global = true, default_value = "config/framework.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run test cases on every eligible device
    Run {
        /// Test case id, comma separated ids, or "all"
        #[arg(short, long, default_value = "all")]
        test_case: String,

        /// Only run test cases tagged with this environment
        #[arg(short, long, default_value = "stage")]
        env: String,

        /// Test suite directory
        #[arg(short, long, default_value = "test_suite")]
        suite: PathBuf,

        /// Print the selected test cases and exit
        #[arg(long, default_value = "false")]
        list_tests: bool,
    },

    /// List test cases in a suite
    List {
        /// Test suite directory
        #[arg(short, long, default_value = "test_suite")]
        suite: PathBuf,
    },

    /// List connected devices
    Devices,

    /// Render the HTML report from a results file
    Report {
        /// Aggregated results JSON
        #[arg(short, long, default_value = "artifacts/results/results.json")]
        results: PathBuf,

        /// Output file path
        #[arg(short, long, default_value = "artifacts/results/report.html")]
        output: PathBuf,
    },
}

fn load_config(path: &Path) -> anyhow::Result<FrameworkConfig> {
    if path.exists() {
        FrameworkConfig::load(path)
    } else {
        Ok(FrameworkConfig::default())
    }
}

fn print_tests(suite: &Suite) -> anyhow::Result<()> {
    let ids = suite.test_ids()?;
    if ids.is_empty() {
        println!("{} No test cases in {}", "ℹ".blue(), suite.root().display());
        return Ok(());
    }
    println!("{}", "Test cases:".bold());
    for id in ids {
        match suite.load_test(&id) {
            Ok(test) => println!(
                "  {} {} [{}]",
                id.cyan(),
                test.test_metadata.name,
                test.test_metadata.tags.join(", ").yellow()
            ),
            Err(e) => println!("  {} {}", id.cyan(), e.to_string().red()),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    // RUST_LOG wins over the configured level
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.artifacts.logs.level.as_str()),
    )
    .init();
    if !cli.config.exists() {
        log::warn!("{} not found, using defaults", cli.config.display());
    }

    match cli.command {
        Commands::Run {
            test_case,
            env,
            suite,
            list_tests,
        } => {
            if list_tests {
                return print_tests(&Suite::load(&suite)?);
            }

            println!("{} Running {} from: {}", "▶".green().bold(), test_case.cyan(), suite.display());
            println!("  Env: {}", env.yellow());
            if config.core.parallel_execution {
                println!("  Parallel: {} (max {} workers)", "Enabled".yellow(), config.core.max_workers);
            }
            println!(
                "  Artifacts: {}",
                config.core.artifacts_root.display().to_string().cyan()
            );

            let passed = runner::run_tests(
                config,
                runner::RunOptions {
                    suite,
                    test_case,
                    env,
                },
            )
            .await?;
            if !passed {
                std::process::exit(1);
            }
        }

        Commands::List { suite } => print_tests(&Suite::load(&suite)?)?,

        Commands::Devices => driver::list_devices().await?,

        Commands::Report { results, output } => {
            println!(
                "{} Generating report from: {}",
                "📊".to_string().blue(),
                results.display()
            );
            report::generate_report(&results, &output)?;
            println!("  Saved: {}", output.display().to_string().cyan());
        }
    }

    Ok(())
}
