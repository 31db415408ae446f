//! Configuration view and validation commands: `civic-sign config`.

use anyhow::Result;

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &std::path::Path, command: Option<ConfigCommands>) -> Result<()> {
    use civic_sign::config::{CONFIG_FILE_NAME, SigningToml, get_config_dir};

    let config_dir = get_config_dir(project_dir);
    let config_path = config_dir.join(CONFIG_FILE_NAME);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("civic-sign Configuration");
            println!("========================");
            println!();

            let toml = if config_path.exists() {
                println!("Config file: {}", config_path.display());
                SigningToml::load(&config_path)?
            } else {
                println!("No civic-sign.toml found at {}", config_path.display());
                println!("Using default configuration.");
                SigningToml::default()
            };
            println!();

            let mut effective = toml.clone();
            effective.apply_env()?;

            println!("[server]");
            println!("  host = \"{}\"", effective.server.host);
            println!("  port = {}", effective.server.port);
            println!("  dev_mode = {}", effective.server.dev_mode);
            println!();
            println!("[database]");
            println!("  path = \"{}\"", effective.database.path.display());
            println!();
            println!("[sms]");
            println!("  gateway = \"{}\"", effective.sms.gateway);
            if let Some(endpoint) = &effective.sms.endpoint {
                println!("  endpoint = \"{}\"", endpoint);
            }
            let key_state = if effective.sms.api_key().is_some() {
                "set"
            } else {
                "unset"
            };
            println!("  api_key = <{}>", key_state);
            println!("  code_length = {}", effective.sms.code_length);
            println!("  code_ttl_secs = {}", effective.sms.code_ttl_secs);
            println!("  dispatch_timeout_ms = {}", effective.sms.dispatch_timeout_ms);
            println!("  max_code_attempts = {}", effective.sms.max_code_attempts);
            println!();
            println!("[session]");
            println!("  cookie_name = \"{}\"", effective.session.cookie_name);
            println!("  ttl_hours = {}", effective.session.ttl_hours);
            println!("  secure_cookie = {}", effective.session.secure_cookie);
            println!();
            println!("[auth]");
            println!("  signer_header = \"{}\"", effective.auth.signer_header);
            println!();
            println!("[logging]");
            println!("  filter = \"{}\"", effective.logging.filter);
            println!("  json = {}", effective.logging.json);
            println!();

            if !config_path.exists() {
                println!("Run 'civic-sign config init' to create a civic-sign.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No civic-sign.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = SigningToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("civic-sign.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if !config_dir.exists() {
                std::fs::create_dir_all(&config_dir)?;
            }

            let toml = SigningToml::default();
            toml.save(&config_path)?;

            println!("Created civic-sign.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [server] host, port");
            println!("  - [sms] gateway, endpoint, max_code_attempts");
            println!("  - [auth] signer_header");
            println!();
        }
    }

    Ok(())
}
