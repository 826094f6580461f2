use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kubesec::config::{Config, CONFIG_FILE};
use kubesec::error::{KubesecError, Result};
use kubesec::manifest::Manifest;
use kubesec::output::{self, OutputFormat};
use kubesec::pss::Evaluator;
use kubesec::rules::Ruleset;
use kubesec::server::{self, ServerConfig};
use kubesec::{intoto, ScanOptions};

#[derive(Parser)]
#[command(
    name = "kubesec",
    about = "Security risk analysis for Kubernetes resources",
    version,
    author
)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a Kubernetes manifest against the security rules
    Scan {
        /// Manifest file, or - for stdin
        file: PathBuf,

        /// Config file path
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Output format (json, yaml, table, sarif)
        #[arg(long, short = 'f', default_value = "json")]
        format: String,

        /// Write output to file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Kubernetes version the schemas are taken from
        #[arg(long, env = "K8S_SCHEMA_VER")]
        kubernetes_version: Option<String>,

        /// Schema location (path or URL), may be repeated
        #[arg(long, env = "SCHEMA_LOCATION", value_delimiter = ',')]
        schema_location: Vec<String>,

        /// Skip schema validation
        #[arg(long)]
        disable_validation: bool,

        /// Report the absolute path of the scanned file
        #[arg(long)]
        absolute_path: bool,

        /// Exit code when a resource fails the scan
        #[arg(long)]
        exit_code: Option<i32>,

        /// Print in-toto link metadata instead of the reports
        #[arg(long)]
        in_toto: bool,
    },

    /// Check a manifest against a Pod Security Standards profile
    PssScan {
        /// Manifest file, or - for stdin
        file: PathBuf,

        /// Config file path
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Profile level (privileged, baseline, restricted)
        #[arg(long)]
        profile: Option<String>,

        /// Profile version (latest, v1.NN)
        #[arg(long, alias = "kubernetes-version")]
        profile_version: Option<String>,

        /// Output format (json, yaml)
        #[arg(long, short = 'f', default_value = "json")]
        format: String,

        /// Report the absolute path of the scanned file
        #[arg(long)]
        absolute_path: bool,

        /// Exit code when the policy is not satisfied
        #[arg(long)]
        exit_code: Option<i32>,
    },

    /// Print the rule catalogue
    PrintRules {
        /// Output format (json, yaml, table)
        #[arg(long, short = 'f', default_value = "table")]
        format: String,
    },

    /// Serve scans over HTTP
    Http {
        /// Port to listen on
        #[arg(value_name = "PORT")]
        port_arg: Option<u16>,

        #[arg(long, env = "PORT", default_value_t = 8080)]
        port: u16,

        /// Graceful shutdown timeout in seconds
        #[arg(long, default_value_t = 5)]
        timeout: u64,

        /// Config file path
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Generate a starter .kubesec.toml config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let result = match cli.command {
        Commands::Scan {
            file,
            config,
            format,
            output,
            kubernetes_version,
            schema_location,
            disable_validation,
            absolute_path,
            exit_code,
            in_toto,
        } => load_config(config.as_deref()).and_then(|mut config| {
            if let Some(version) = kubernetes_version {
                config.schema.kubernetes_version = version;
            }
            if !schema_location.is_empty() {
                config.schema.locations = schema_location;
            }
            config.schema.disable_validation |= disable_validation;
            config.scan.absolute_path |= absolute_path;
            if let Some(code) = exit_code {
                config.scan.exit_code = code;
            }
            cmd_scan(&file, &config, &format, output.as_deref(), in_toto)
        }),
        Commands::PssScan {
            file,
            config,
            profile,
            profile_version,
            format,
            absolute_path,
            exit_code,
        } => load_config(config.as_deref()).and_then(|mut config| {
            if let Some(profile) = profile {
                config.pss.profile = profile;
            }
            if let Some(version) = profile_version {
                config.pss.version = version;
            }
            config.scan.absolute_path |= absolute_path;
            if let Some(code) = exit_code {
                config.scan.exit_code = code;
            }
            cmd_pss_scan(&file, &config, &format)
        }),
        Commands::PrintRules { format } => cmd_print_rules(&format),
        Commands::Http {
            port_arg,
            port,
            timeout,
            config,
        } => load_config(config.as_deref()).and_then(|config| {
            let server_config = ServerConfig {
                port: port_arg.unwrap_or(port),
                shutdown_timeout: Duration::from_secs(timeout),
            };
            cmd_http(server_config, &config)
        }),
        Commands::Init { force } => cmd_init(force),
    };

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    Config::load(path.unwrap_or(Path::new(CONFIG_FILE)))
}

fn parse_format(format_str: &str, fallback: OutputFormat) -> OutputFormat {
    OutputFormat::from_str_lenient(format_str).unwrap_or_else(|| {
        eprintln!("Warning: unknown format '{}', using {}", format_str, fallback.as_str());
        fallback
    })
}

fn write_output(rendered: &str, output_path: Option<&Path>) -> Result<()> {
    match output_path {
        Some(out) => std::fs::write(out, rendered)?,
        None => print!("{}", rendered),
    }
    Ok(())
}

fn cmd_scan(
    file: &Path,
    config: &Config,
    format_str: &str,
    output_path: Option<&Path>,
    in_toto: bool,
) -> Result<i32> {
    let format = parse_format(format_str, OutputFormat::Json);
    let options = ScanOptions::from(config);

    let manifest = Manifest::read(file, options.absolute_path)?;
    let reports = kubesec::scan_manifest(&manifest, &options)?;

    let rendered = if in_toto {
        let link = intoto::generate_link(&manifest.name, &reports, &manifest.bytes)?;
        output::json::render(&link)?
    } else {
        kubesec::render_report(&reports, format)?
    };
    write_output(&rendered, output_path)?;

    // reports are out before the exit status is decided
    Ok(if kubesec::has_failures(&reports) {
        config.scan.exit_code
    } else {
        0
    })
}

fn normalize_profile_version(version: &str) -> String {
    if version == "latest" || version.starts_with('v') {
        version.to_string()
    } else {
        format!("v{version}")
    }
}

fn cmd_pss_scan(file: &Path, config: &Config, format_str: &str) -> Result<i32> {
    let format = parse_format(format_str, OutputFormat::Json);
    let manifest = Manifest::read(file, config.scan.absolute_path)?;
    let version = normalize_profile_version(&config.pss.version);

    let outcome = Evaluator::new().run(&manifest.name, &manifest.bytes, &config.pss.profile, &version)?;
    let rendered = output::render_pss(&outcome.reports, format)?;
    write_output(&rendered, None)?;

    match outcome.violation {
        Some(violation) => {
            eprintln!("{}", violation);
            Ok(config.scan.exit_code)
        }
        None => Ok(0),
    }
}

fn cmd_print_rules(format_str: &str) -> Result<i32> {
    let format = parse_format(format_str, OutputFormat::Table);
    let ruleset = Ruleset::new(Default::default());
    let rendered = output::render_rules(&ruleset.rules(), format)?;
    write_output(&rendered, None)?;
    Ok(0)
}

fn cmd_http(server_config: ServerConfig, config: &Config) -> Result<i32> {
    let ruleset = Ruleset::new(config.schema.clone());
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| KubesecError::Server(format!("unable to start runtime: {e}")))?;
    runtime.block_on(server::serve(server_config, ruleset))?;
    Ok(0)
}

fn cmd_init(force: bool) -> Result<i32> {
    let path = PathBuf::from(CONFIG_FILE);

    if path.exists() && !force {
        eprintln!("{} already exists. Use --force to overwrite.", CONFIG_FILE);
        return Ok(1);
    }

    std::fs::write(&path, Config::starter_toml())?;
    println!("Created {}", CONFIG_FILE);

    Ok(0)
}
