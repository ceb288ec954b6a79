//! Worker bootstrap orchestration.
//!
//! Startup runs in a fixed order: validate the bootstrap path, load
//! configuration, initialise telemetry, then load the manifest. Any failure
//! is fatal and happens before readiness is signalled.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use tally_config::{CONFIG_CLI_FLAGS, Config};

use crate::errors::LaunchError;
use crate::health::HealthReporter;
use crate::manifest::BootstrapManifest;
use crate::telemetry;

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the worker configuration from the configuration flags in
    /// `args`. The first element is the program name.
    fn load(&self, args: &[OsString]) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that layers defaults, file, environment and CLI flags.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, Arc<OrthoError>> {
        Config::load_from_iter(args.iter().cloned())
    }
}

/// Loader returning a fixed configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader(pub Config);

impl ConfigLoader for StaticConfigLoader {
    fn load(&self, _args: &[OsString]) -> Result<Config, Arc<OrthoError>> {
        Ok(self.0.clone())
    }
}

/// Positional launch arguments supplied by the parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchArgs {
    bootstrap_path: PathBuf,
    log_file: Option<PathBuf>,
}

impl LaunchArgs {
    /// Splits `args` into configuration flags and launch arguments.
    ///
    /// Configuration flags must precede the positionals; the returned flag
    /// list keeps the program name as its first element.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::MissingBootstrapPath`] when no positional is
    /// present and [`LaunchError::BootstrapNotFound`] when it names a path
    /// that does not exist.
    pub fn parse(args: &[OsString]) -> Result<(Vec<OsString>, Self), LaunchError> {
        let (config_arguments, positionals) = split_config_arguments(args);
        let mut positionals = positionals.iter();
        let bootstrap_path = positionals
            .next()
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
            .ok_or(LaunchError::MissingBootstrapPath)?;
        if !bootstrap_path.exists() {
            return Err(LaunchError::BootstrapNotFound {
                path: bootstrap_path,
            });
        }
        let log_file = positionals
            .next()
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);
        Ok((
            config_arguments,
            Self {
                bootstrap_path,
                log_file,
            },
        ))
    }

    /// Path of the bootstrap manifest.
    #[must_use]
    pub fn bootstrap_path(&self) -> &Path {
        &self.bootstrap_path
    }

    /// Log file requested by the parent, if any.
    #[must_use]
    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }
}

fn is_config_flag(argument: &OsStr) -> Option<bool> {
    let text = argument.to_string_lossy();
    if !text.starts_with("--") {
        return None;
    }
    let mut parts = text.splitn(2, '=');
    let flag = parts.next()?;
    let has_inline_value = parts.next().is_some();
    CONFIG_CLI_FLAGS
        .contains(&flag)
        .then_some(!has_inline_value)
}

fn split_config_arguments(args: &[OsString]) -> (Vec<OsString>, &[OsString]) {
    let Some((program, rest)) = args.split_first() else {
        return (Vec::new(), args);
    };
    let mut config_arguments = vec![program.clone()];
    let mut index = 0;
    while let Some(argument) = rest.get(index) {
        let Some(needs_value) = is_config_flag(argument) else {
            break;
        };
        config_arguments.push(argument.clone());
        index += 1;
        if needs_value {
            if let Some(value) = rest.get(index) {
                config_arguments.push(value.clone());
                index += 1;
            }
        }
    }
    (config_arguments, rest.get(index..).unwrap_or_default())
}

/// Result of a successful bootstrap.
#[derive(Debug)]
pub struct Bootstrap {
    config: Config,
    launch: LaunchArgs,
    manifest: BootstrapManifest,
}

impl Bootstrap {
    /// Resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Launch arguments supplied by the parent.
    #[must_use]
    pub fn launch(&self) -> &LaunchArgs {
        &self.launch
    }

    /// Loaded bootstrap manifest.
    #[must_use]
    pub fn manifest(&self) -> &BootstrapManifest {
        &self.manifest
    }
}

/// Runs the startup sequence using the supplied collaborators.
///
/// # Errors
///
/// Returns the first fatal [`LaunchError`]; it has already been passed to
/// [`HealthReporter::bootstrap_failed`].
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: &dyn HealthReporter,
    args: &[OsString],
) -> Result<Bootstrap, LaunchError> {
    reporter.bootstrap_starting();
    run_bootstrap(loader, reporter, args).inspect_err(|error| reporter.bootstrap_failed(error))
}

fn run_bootstrap(
    loader: &dyn ConfigLoader,
    reporter: &dyn HealthReporter,
    args: &[OsString],
) -> Result<Bootstrap, LaunchError> {
    let (config_arguments, launch) = LaunchArgs::parse(args)?;
    let config = loader.load(&config_arguments)?;
    telemetry::initialise(&config, launch.log_file())?;
    reporter.worker_initialising(&config);
    let manifest = BootstrapManifest::load(launch.bootstrap_path())?;
    Ok(Bootstrap {
        config,
        launch,
        manifest,
    })
}
