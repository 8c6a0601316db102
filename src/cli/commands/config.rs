//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager, LOCAL_CONFIG_FILE};
use crate::error::{OutsyncError, OutsyncResult};
use crate::ui::{self, UiContext};
use std::path::Path;
use tokio::fs;

/// Keys accepted by `config set`
const VALID_KEYS: &[&str] = &[
    "general.verbose",
    "general.log_format",
    "build.input",
    "build.cache_dir",
    "build.output_dir",
    "build.work_dir",
    "build.record",
    "build.log_stats",
    "build.prevent_symlink_resolution",
    "build.link_mode",
    "build.prune_stale",
    "build.exclude",
    "compiler.program",
    "compiler.args",
    "compiler.output.filename",
    "compiler.resolve.extensions",
];

/// Execute the config command
pub async fn execute(
    args: ConfigArgs,
    manager: &ConfigManager,
    config: &Config,
) -> OutsyncResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => show_path(manager),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
        Some(ConfigAction::Set { key, value, local }) => {
            if local {
                set_local_value(&key, &value).await?
            } else {
                set_value(manager, &key, &value).await?
            }
        }
    }

    Ok(())
}

fn show_config(config: &Config) -> OutsyncResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

fn show_path(manager: &ConfigManager) {
    println!("{}", manager.path().display());
}

async fn init_config(manager: &ConfigManager, force: bool) -> OutsyncResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn_hint(
            &ctx,
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;

    ui::step_ok_detail(
        &ctx,
        "Configuration initialized",
        &path.display().to_string(),
    );

    Ok(())
}

/// Set a key in the global config file only, leaving local overrides out
async fn set_value(manager: &ConfigManager, key: &str, value: &str) -> OutsyncResult<()> {
    let ctx = UiContext::detect();
    validate_config_key(key)?;

    let mut doc = toml::Value::try_from(manager.load().await?)?;
    set_toml_value(&mut doc, key, value)?;
    let config = checked(doc, key)?;

    manager.save(&config).await?;
    ui::step_ok(&ctx, &format!("Set {} = {}", key, value));

    Ok(())
}

async fn set_local_value(key: &str, value: &str) -> OutsyncResult<()> {
    let ctx = UiContext::detect();
    validate_config_key(key)?;

    let cwd = std::env::current_dir()
        .map_err(|e| OutsyncError::io("getting current directory", e))?;
    let local_path =
        ConfigManager::find_local_config(&cwd).unwrap_or_else(|| cwd.join(LOCAL_CONFIG_FILE));

    // Load existing local config or start with an empty TOML table
    let mut doc = read_local(&local_path).await?;
    set_toml_value(&mut doc, key, value)?;
    checked(doc.clone(), key)?;

    // Write back only the keys the user has explicitly set
    let content = toml::to_string_pretty(&doc)?;
    fs::write(&local_path, content)
        .await
        .map_err(|e| OutsyncError::io(format!("writing {}", local_path.display()), e))?;

    ui::step_ok(
        &ctx,
        &format!("Set {} = {} in {}", key, value, local_path.display()),
    );

    Ok(())
}

async fn read_local(path: &Path) -> OutsyncResult<toml::Value> {
    if !path.exists() {
        return Ok(toml::Value::Table(toml::Table::new()));
    }

    let content = fs::read_to_string(path)
        .await
        .map_err(|e| OutsyncError::io(format!("reading {}", path.display()), e))?;
    content
        .parse::<toml::Table>()
        .map(toml::Value::Table)
        .map_err(|e| OutsyncError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Make sure the edited tree still deserializes
fn checked(doc: toml::Value, key: &str) -> OutsyncResult<Config> {
    doc.try_into::<Config>()
        .map_err(|e| OutsyncError::InvalidConfigValue {
            key: key.to_string(),
            reason: e.message().to_string(),
        })
}

fn validate_config_key(key: &str) -> OutsyncResult<()> {
    if VALID_KEYS.contains(&key) {
        return Ok(());
    }

    eprintln!("Valid keys:");
    for valid in VALID_KEYS {
        eprintln!("  {}", valid);
    }
    Err(OutsyncError::UnknownConfigKey(key.to_string()))
}

/// Set a dot-separated key in a TOML value tree, creating intermediate tables as needed.
fn set_toml_value(doc: &mut toml::Value, key: &str, value: &str) -> OutsyncResult<()> {
    let mut parts: Vec<&str> = key.split('.').collect();
    let leaf = parts.pop().unwrap_or(key);
    let mut current = doc;

    // Navigate/create intermediate tables
    for part in parts {
        current = current
            .as_table_mut()
            .ok_or_else(|| OutsyncError::InvalidConfigValue {
                key: key.to_string(),
                reason: format!("{} is not a table", part),
            })?
            .entry(part)
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
    }

    let table = current
        .as_table_mut()
        .ok_or_else(|| OutsyncError::InvalidConfigValue {
            key: key.to_string(),
            reason: "parent is not a table".to_string(),
        })?;

    table.insert(leaf.to_string(), typed_value(key, value)?);
    Ok(())
}

/// Convert a command-line value into the TOML type the key expects
fn typed_value(key: &str, value: &str) -> OutsyncResult<toml::Value> {
    let value = match key {
        "compiler.args" | "compiler.resolve.extensions" | "build.exclude" => toml::Value::Array(
            value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| toml::Value::String(item.to_string()))
                .collect(),
        ),
        "general.verbose" | "build.prevent_symlink_resolution" | "build.prune_stale" => {
            toml::Value::Boolean(parse_bool(key, value)?)
        }
        "build.log_stats" => match parse_bool(key, value) {
            Ok(flag) => toml::Value::Boolean(flag),
            Err(_) => toml::Value::String(value.to_string()),
        },
        _ => toml::Value::String(value.to_string()),
    };
    Ok(value)
}

fn parse_bool(key: &str, value: &str) -> OutsyncResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(OutsyncError::InvalidConfigValue {
            key: key.to_string(),
            reason: format!("invalid boolean value: {}, use true/false", value),
        }),
    }
}
