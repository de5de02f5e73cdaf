#![forbid(unsafe_code)]

use anyhow::{Result, anyhow};
use log::{info, error, LevelFilter};
use serde::Deserialize;
use std::{env, fs, path::Path};
use toml;
use fs_mistrust::Mistrust;
use std::os::unix::fs::PermissionsExt;
use lazy_static::lazy_static;
use structopt::StructOpt;

use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Root};
use log4rs::encode::pattern::PatternEncoder;

use sqlx::{Postgres, Pool};
use futures::executor::block_on;

// Visitor Server Utilities
use crate::utils::{vsd_utils, db_init, errors::Errors};
use crate::utils::db_init::RetryPolicy;

use super::vsd_utils::get_absolute_path;

// ***************************************************************************
//                                Constants
// ***************************************************************************
// Directory and file locations. Unless otherwise noted, all files and directories
// are relative to the root directory.
const ENV_VSD_ROOT_DIR     : &str = "VSD_ROOT_DIR";
const DEFAULT_ROOT_DIR     : &str = "~/.vsd";
const CONFIG_DIR           : &str = "/config";
const LOGS_DIR             : &str = "/logs";
const LOG4RS_CONFIG_FILE   : &str = "/log4rs.yml"; // relative to config dir
const VSD_CONFIG_FILE      : &str = "/vsd.toml";   // relative to config dir

// Networking.
const DEFAULT_HTTP_ADDR    : &str = "http://localhost";
const DEFAULT_HTTP_PORT    : u16  = 8000;

// Database host selection.
pub const ENV_VSD_DB_HOST  : &str = "VSD_DB_HOST";
pub const DEFAULT_DB_HOST  : &str = "127.0.0.1";

// ***************************************************************************
//                             Static Variables
// ***************************************************************************
// Assign the command line arguments BEFORE RUNTIME_CTX is initialized in main.
lazy_static! {
    pub static ref VSD_ARGS: VsdArgs = init_vsd_args();
}

// Calculate the data directories BEFORE RUNTIME_CTX is initialized in main.
lazy_static! {
    pub static ref VSD_DIRS: VsdDirs = init_vsd_dirs();
}

// ***************************************************************************
//                             Directory Structs
// ***************************************************************************
// ---------------------------------------------------------------------------
// VsdDirs:
// ---------------------------------------------------------------------------
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct VsdDirs {
    pub root_dir: String,
    pub config_dir: String,
    pub logs_dir: String,
}

// ***************************************************************************
//                               Config Structs
// ***************************************************************************
// ---------------------------------------------------------------------------
// CommandLineArgs:
// ---------------------------------------------------------------------------
#[derive(Debug, StructOpt)]
#[structopt(name = "vsd_args", about = "Command line arguments for the visitor server.")]
pub struct VsdArgs {
    /// Specify the server's root data directory.
    ///
    /// This directory contains the configuration and log files the server
    /// uses during execution.
    #[structopt(short, long)]
    pub root_dir: Option<String>,
}

// ---------------------------------------------------------------------------
// Parms:
// ---------------------------------------------------------------------------
#[derive(Debug)]
#[allow(dead_code)]
pub struct Parms {
    pub config_file: String,
    pub config: Config,
}

// ---------------------------------------------------------------------------
// RuntimeCtx:
// ---------------------------------------------------------------------------
#[derive(Debug)]
#[allow(dead_code)]
pub struct RuntimeCtx {
    pub parms: Parms,
    pub db: Pool<Postgres>,
    pub vsd_args: &'static VsdArgs,
    pub vsd_dirs: &'static VsdDirs,
}

// ---------------------------------------------------------------------------
// Config:
// ---------------------------------------------------------------------------
#[derive(Debug, Deserialize)]
#[serde(default)]
#[allow(dead_code)]
pub struct Config {
    pub title: String,
    pub http_addr: String,
    pub http_port: u16,
    pub db_host: Option<String>,
    pub db_max_connect_attempts: u32,
}

impl Config {
    #[allow(dead_code)]
    pub fn new() -> Self {
        Config::default()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            title: "Visitor Server".to_string(),
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            db_host: None,
            db_max_connect_attempts: db_init::DEFAULT_MAX_ATTEMPTS,
        }
    }
}

// ***************************************************************************
//                            Directory Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// init_vsd_args:
// ---------------------------------------------------------------------------
/** Get the command line arguments. */
fn init_vsd_args() -> VsdArgs {
    let args = VsdArgs::from_args();
    println!("{:?}", args);
    args
}

// ---------------------------------------------------------------------------
// init_vsd_dirs:
// ---------------------------------------------------------------------------
/** Calculate the external data directories. */
fn init_vsd_dirs() -> VsdDirs {
    // Initialize the mistrust object.
    let mistrust = get_mistrust();

    // Check that each path is absolute and is a directory with the
    // proper permission assign if it exists.  If it doesn't exist,
    // create it.
    let root_dir = get_root_dir();
    check_vsd_dir(&root_dir, "root directory", &mistrust);

    let config_dir = root_dir.clone() + CONFIG_DIR;
    check_vsd_dir(&config_dir, "config directory", &mistrust);

    let logs_dir = root_dir.clone() + LOGS_DIR;
    check_vsd_dir(&logs_dir, "logs directory", &mistrust);

    // Package up and return the directories.
    VsdDirs {
        root_dir, config_dir, logs_dir,
    }
}

// ---------------------------------------------------------------------------
// check_vsd_dir:
// ---------------------------------------------------------------------------
/** Check that the path is absolute and, if it exists, that is has the proper
 * permissions assigned.  If it doesn't exist, create it.  The mistrust package
 * creates directories with 0o700 permissions.
 *
 * Any failure results in a panic.
 */
fn check_vsd_dir(dir: &String, msgname: &str, mistrust: &Mistrust ) {
    // Get the path object.
    let path = Path::new(dir);
    if !path.is_absolute() {
        panic!("The server's {} path must be absolute: {}", msgname, dir);
    }
    if path.exists() {
        // Make sure the path represents a directory.
        if !path.is_dir() {
            panic!("The server's {} path must be a directory: {}", msgname, dir);
        }

        // Make sure the directory had rwx for owner only.
        let meta = path.metadata().unwrap_or_else(|_| panic!("Unable to read metadata for {}: {}", msgname, dir));
        let perm = meta.permissions().mode();
        if perm & 0o777 != 0o700 {
            panic!("The server's {} path must be have 0o700 permissions: {}", msgname, dir);
        }
    } else {
        // Create the directory with the correct permissions.
        match mistrust.make_directory(path) {
            Ok(_) => (),
            Err(e) => {
                panic!("Make directory error for {:?}: {}", path, &e.to_string());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// get_mistrust:
// ---------------------------------------------------------------------------
/** Configure a new mistrust object for initial directory processing. */
fn get_mistrust() -> Mistrust {
    // Configure our mistrust object.
    let mistrust = match Mistrust::builder()
        .ignore_prefix(get_absolute_path("~"))
        .trust_group(0)
        .build() {
            Ok(m) => m,
            Err(e) => {
                panic!("Mistrust configuration error: {}", &e.to_string());
            }
        };
    mistrust
}

// ---------------------------------------------------------------------------
// get_root_dir:
// ---------------------------------------------------------------------------
fn get_root_dir() -> String {
    // Order of precedence:
    //  1. Environment variable
    //  2. Command line --root-dir argument
    //  3. Default location
    //
    let root_dir = env::var(ENV_VSD_ROOT_DIR).unwrap_or_else(
        |_| {
            match VSD_ARGS.root_dir.clone() {
                Some(r) => r,
                None => DEFAULT_ROOT_DIR.to_string(),
            }
        });

    // Canonicalize the path.
    get_absolute_path(&root_dir)
}

// ***************************************************************************
//                               Log Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// init_log:
// ---------------------------------------------------------------------------
pub fn init_log() {
    // Initialize log4rs logging from the site configuration file when one
    // exists; otherwise log to the console so the demo runs out of the box.
    let logconfig = init_log_config();
    if Path::new(&logconfig).is_file() {
        match log4rs::init_file(logconfig.clone(), Default::default()) {
            Ok(_) => (),
            Err(e) => {
                println!("{}", e);
                let s = format!("{}", Errors::Log4rsInitialization(logconfig));
                panic!("{}", s);
            },
        }
        info!("Log4rs initialized using: {}", logconfig);
    } else {
        init_console_log(&logconfig);
        info!("Log4rs initialized with console defaults, no file at: {}", logconfig);
    }
}

// ---------------------------------------------------------------------------
// init_console_log:
// ---------------------------------------------------------------------------
/** Build a minimal console-only log4rs configuration.  Failures here leave
 * the process without any logging, so they abort like the file-based path.
 */
fn init_console_log(logconfig: &str) {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d(%Y-%m-%d %H:%M:%S)} {l} {f}:{L} - {m}{n}")))
        .build();
    let config = match log4rs::config::Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(LevelFilter::Info)) {
            Ok(c) => c,
            Err(e) => {
                println!("{}", e);
                panic!("{}", Errors::Log4rsInitialization(logconfig.to_string()));
            },
        };
    match log4rs::init_config(config) {
        Ok(_) => (),
        Err(e) => {
            println!("{}", e);
            panic!("{}", Errors::Log4rsInitialization(logconfig.to_string()));
        },
    }
}

// ---------------------------------------------------------------------------
// init_log_config:
// ---------------------------------------------------------------------------
fn init_log_config() -> String {
    VSD_DIRS.config_dir.clone() + LOG4RS_CONFIG_FILE
}

/// ***************************************************************************
//                             Parms Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// get_parms:
// ---------------------------------------------------------------------------
/** Retrieve the application parameters from the configuration file in the
 * config data directory.  If the file cannot be read, default values are
 * used.
 */
fn get_parms() -> Result<Parms> {
    // Get the config file path from its data directory.
    let config_file = VSD_DIRS.config_dir.clone() + VSD_CONFIG_FILE;

    // Read the cofiguration file.
    let config_file_abs = vsd_utils::get_absolute_path(&config_file);
    info!("{}", Errors::ReadingConfigFile(config_file_abs.clone()));
    let contents = match fs::read_to_string(&config_file_abs) {
        Ok(c) => c,
        Err(_) => {
            println!("Unable to read configuration at {}. Using default values.", config_file);
            return Ok(Parms { config_file: Default::default(), config: Config::new() });
        }
    };

    // Parse the toml configuration.
    let config : Config = match toml::from_str(&contents) {
        Ok(c)  => c,
        Err(e) => {
            let msg = format!("{}\n   {}", Errors::TOMLParseError(config_file_abs), e);
            error!("{}", msg);
            return Result::Err(anyhow!(msg));
        }
    };

    Ok(Parms { config_file: config_file_abs, config })
}

// ***************************************************************************
//                             Config Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// resolve_db_host:
// ---------------------------------------------------------------------------
/** Resolve the database host as an explicit function of its two optional
 * inputs.  Precedence: environment variable, configuration file, loopback
 * default.  Empty and whitespace-only values fall through to the next layer.
 */
pub fn resolve_db_host(env_host: Option<String>, config_host: Option<&str>) -> String {
    if let Some(h) = env_host {
        if !h.trim().is_empty() {
            return h;
        }
    }
    if let Some(h) = config_host {
        if !h.trim().is_empty() {
            return h.to_string();
        }
    }
    DEFAULT_DB_HOST.to_string()
}

// ---------------------------------------------------------------------------
// init_runtime_context:
// ---------------------------------------------------------------------------
/** Assemble the runtime context, establishing the database pool through the
 * startup connector.  Errors propagate to the caller in main, which alone
 * decides to terminate the process.
 */
pub fn init_runtime_context() -> Result<RuntimeCtx> {
    let parms = get_parms()?;

    // The database host comes from the environment, the config file or the
    // loopback default, in that order.
    let db_host = resolve_db_host(env::var(ENV_VSD_DB_HOST).ok(),
                                  parms.config.db_host.as_deref());
    let policy = RetryPolicy { max_attempts: parms.config.db_max_connect_attempts };

    info!("Connecting to the database at host {}.", db_host);
    let db = block_on(db_init::init_db(&db_host, policy))?;

    Ok(RuntimeCtx { parms, db, vsd_args: &VSD_ARGS, vsd_dirs: &VSD_DIRS })
}

// ***************************************************************************
//                                  Tests
// ***************************************************************************
#[cfg(test)]
mod tests {
    use crate::utils::config::{resolve_db_host, Config, DEFAULT_DB_HOST};

    #[test]
    fn print_config() {
        println!("{:?}", Config::new());
    }

    #[test]
    fn default_retry_bound_is_seven() {
        assert_eq!(Config::new().db_max_connect_attempts, 7);
    }

    #[test]
    fn empty_host_resolves_to_loopback() {
        assert_eq!(resolve_db_host(None, None), DEFAULT_DB_HOST);
        assert_eq!(resolve_db_host(Some("".to_string()), None), DEFAULT_DB_HOST);
        assert_eq!(resolve_db_host(Some("  ".to_string()), Some("")), DEFAULT_DB_HOST);
    }

    #[test]
    fn env_host_wins_over_config_host() {
        let host = resolve_db_host(Some("db.example.com".to_string()), Some("cfg.example.com"));
        assert_eq!(host, "db.example.com");
    }

    #[test]
    fn config_host_wins_over_default() {
        assert_eq!(resolve_db_host(None, Some("cfg.example.com")), "cfg.example.com");
        assert_eq!(resolve_db_host(Some("".to_string()), Some("cfg.example.com")), "cfg.example.com");
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: Config = toml::from_str("http_port = 9000").unwrap();
        assert_eq!(config.http_port, 9000);
        assert_eq!(config.db_max_connect_attempts, 7);
        assert!(config.db_host.is_none());
    }
}
