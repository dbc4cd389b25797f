use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use vset_tester::client::{CiServer, RestClient};
use vset_tester::dsl::TemplateLoader;
use vset_tester::provision::{self, Provisioner};
use vset_tester::report;
use vset_tester::runner::{self, ConsoleEventListener, EventEmitter, HarnessEnv};
use vset_tester::suites::Suite;
use vset_tester::utils::{Clock, Credentials, RunConfig, SystemClock};
use vset_tester::vcs;

#[derive(Parser)]
#[command(name = "vset-tester")]
#[command(version = "0.1.0")]
#[command(about = "Acceptance tests for CI server versioned settings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run test suites against the configured server
    Run {
        /// Suites to run (comma-separated: import, sync, pipeline, all)
        #[arg(short, long)]
        suite: Option<String>,

        /// Output directory for result files and reports
        #[arg(short, long, default_value = "./test-results")]
        output: PathBuf,

        /// YAML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Provision the server before running
        #[arg(long, default_value = "false")]
        provision: bool,

        /// Keep created projects and branches
        #[arg(long, default_value = "false")]
        no_cleanup: bool,
    },

    /// Generate a consolidated report from per-suite result files
    Report {
        /// Directory holding <suite>.json files
        results: PathBuf,

        /// Output format (json, html, junit, text)
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Suites expected in the results (comma-separated)
        #[arg(short, long, default_value = "all")]
        suite: String,
    },

    /// Start (when a compose file is configured), wait for readiness, bootstrap admin
    Provision {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Delete leftover test projects and their settings branches
    Cleanup {
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Also stop the containers
        #[arg(long, default_value = "false")]
        containers: bool,
    },

    /// List or render Kotlin DSL templates
    Templates {
        /// Extra template directory
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Template to render
        #[arg(short, long)]
        render: Option<String>,

        /// Template variables (key=value), repeatable
        #[arg(long = "var")]
        vars: Vec<String>,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<RunConfig> {
    let config = RunConfig::load(path).context("failed to load configuration")?;
    Ok(config)
}

fn provisioner(
    config: &Arc<RunConfig>,
    server: Arc<dyn CiServer>,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<Provisioner> {
    let mut provisioner = Provisioner::new(config.clone(), server, clock);
    if let Some(token) = &config.server.super_user_token {
        let bootstrap = RestClient::from_config(config)?
            .with_credentials(Credentials::Token(token.clone()));
        provisioner = provisioner.with_bootstrap_server(Arc::new(bootstrap));
    }
    Ok(provisioner)
}

fn suite_names(suites: &[Suite]) -> Vec<&'static str> {
    suites.iter().map(Suite::as_str).collect()
}

fn parse_vars(vars: &[String]) -> anyhow::Result<HashMap<String, String>> {
    vars.iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.to_string()))
                .with_context(|| format!("expected key=value, got '{}'", pair))
        })
        .collect()
}

async fn run(
    suite: Option<String>,
    output: PathBuf,
    config: Option<PathBuf>,
    provision: bool,
    no_cleanup: bool,
) -> anyhow::Result<bool> {
    let mut config = load_config(config.as_deref())?;
    if no_cleanup {
        config.cleanup = false;
    }
    let suites = match suite {
        Some(list) => Suite::parse_list(&list)?,
        None => config.suites.clone(),
    };
    let names = suite_names(&suites);
    let config = Arc::new(config);

    println!(
        "{} Running suites: {}",
        "▶".green().bold(),
        names.join(", ").cyan()
    );
    println!("  Server: {}", config.server.url.cyan());
    match &config.git.repo_url {
        Some(url) => println!("  Settings repository: {}", vcs::git::redact(url).cyan()),
        None => println!("  Settings repository: {}", "not configured".yellow()),
    }
    println!("  Output: {}", output.display().to_string().cyan());
    if !config.cleanup {
        println!("  Cleanup: {}", "Disabled".yellow());
    }

    let server: Arc<dyn CiServer> =
        Arc::new(RestClient::from_config(&config).context("failed to create API client")?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());

    let started_containers = provision && config.compose_file.is_some();
    if provision {
        let provisioner = provisioner(&config, server.clone(), clock.clone())?;
        if let Err(e) = provisioner.provision(started_containers).await {
            eprintln!("{} {}", "✗".red().bold(), e);
            let report = report::aggregate::not_run(&names, &e.to_string());
            report::write_all(&report, &output)?;
            print!("{}", report::text::render(&report));
            stop_started_containers(&config, started_containers).await;
            return Ok(false);
        }
    }

    let (emitter, receiver) = EventEmitter::new();
    let listener = tokio::spawn(ConsoleEventListener::listen(receiver));

    let env = HarnessEnv {
        server,
        repos: vcs::factory_from_config(&config.git)?,
        clock,
        templates: Arc::new(TemplateLoader::from_config(&config)?),
        events: Arc::new(emitter),
        config: config.clone(),
    };

    let outcome = runner::run_suites(env, &suites, &output).await?;
    // Every sender is gone once the suites are done
    let _ = listener.await;

    let report = report::aggregate(&output, &names);
    report::write_all(&report, &output).context("failed to write reports")?;
    print!("{}", report::text::render(&report));
    stop_started_containers(&config, started_containers).await;

    Ok(outcome.all_passed(suites.len()) && report.all_passed())
}

/// Failures to stop are reported but never change the run's outcome
async fn stop_started_containers(config: &RunConfig, started_containers: bool) {
    let Some(teardown) = provision::cleanup::teardown_run(config, started_containers).await else {
        return;
    };
    if teardown.containers_stopped {
        println!("{} Containers stopped", "🧹".to_string().blue());
    }
    for failure in &teardown.failures {
        println!("  {} {}", "⚠".yellow(), failure);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            suite,
            output,
            config,
            provision,
            no_cleanup,
        } => {
            let passed = run(suite, output, config, provision, no_cleanup).await?;
            if !passed {
                std::process::exit(1);
            }
        }

        Commands::Report {
            results,
            format,
            output,
            suite,
        } => {
            println!(
                "{} Generating {} report from: {}",
                "📊".to_string().blue(),
                format.cyan(),
                results.display()
            );
            let suites = Suite::parse_list(&suite)?;
            report::generate_report(&results, &suite_names(&suites), &format, output.as_deref())?;
        }

        Commands::Provision { config } => {
            let config = Arc::new(load_config(config.as_deref())?);
            let server: Arc<dyn CiServer> = Arc::new(RestClient::from_config(&config)?);
            let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
            let info = provisioner(&config, server, clock)?
                .provision(config.compose_file.is_some())
                .await?;
            println!(
                "{} Server ready at {} (version {})",
                "✓".green().bold(),
                config.server.url.cyan(),
                info.version.as_deref().unwrap_or("unknown")
            );
        }

        Commands::Cleanup { config, containers } => {
            let config = load_config(config.as_deref())?;
            let server = RestClient::from_config(&config)?;
            let repos = vcs::factory_from_config(&config.git)?;

            let mut cleanup = provision::sweep(&config, &server, repos.as_ref()).await;
            if containers {
                provision::cleanup::stop_containers(&config, &mut cleanup).await;
            }

            println!(
                "{} Removed {} projects and {} branches{}",
                "🧹".to_string().blue(),
                cleanup.projects_removed.len(),
                cleanup.branches_removed,
                if cleanup.containers_stopped {
                    ", containers stopped"
                } else {
                    ""
                }
            );
            for failure in &cleanup.failures {
                println!("  {} {}", "⚠".yellow(), failure);
            }
        }

        Commands::Templates { dir, render, vars } => {
            let loader = match dir {
                Some(dir) => TemplateLoader::with_dir(&dir)?,
                None => TemplateLoader::builtin(),
            }
            .with_default("dsl_version", &RunConfig::default().dsl_version);

            match render {
                Some(name) => print!("{}", loader.render(&name, &parse_vars(&vars)?)?),
                None => {
                    println!("Available templates:");
                    for name in loader.list_available() {
                        println!("  {}", name);
                    }
                }
            }
        }
    }

    Ok(())
}
