//! Environment metadata captured once per scope.
//!
//! The scope asks an [`EnvironmentSource`] for user, machine, domain and
//! culture at begin. Sources are injectable so tests and hosts with their own
//! notion of identity (request principal, tenant) can supply values.

use std::path::Path;

/// Supplier of environment metadata.
pub trait EnvironmentSource: Send + Sync {
    /// Name of the acting user.
    fn user_name(&self) -> Option<String>;
    /// Host name of the machine.
    fn machine_name(&self) -> Option<String>;
    /// Domain of the acting user. Defaults to the machine name.
    fn domain_name(&self) -> Option<String> {
        self.machine_name()
    }
    /// Culture tag, e.g. `en-US`.
    fn culture(&self) -> Option<String>;
}

/// Reads metadata from the process environment.
///
/// - user: `USER`, then `USERNAME`
/// - machine: `HOSTNAME`, then `/etc/hostname`
/// - domain: `USERDOMAIN`, then the machine name
/// - culture: `LC_ALL`, then `LANG` (`en_US.UTF-8` becomes `en-US`)
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemEnvironment;

impl EnvironmentSource for SystemEnvironment {
    fn user_name(&self) -> Option<String> {
        read_env("USER").or_else(|| read_env("USERNAME"))
    }

    fn machine_name(&self) -> Option<String> {
        read_env("HOSTNAME").or_else(|| read_hostname_file(Path::new("/etc/hostname")))
    }

    fn domain_name(&self) -> Option<String> {
        read_env("USERDOMAIN").or_else(|| self.machine_name())
    }

    fn culture(&self) -> Option<String> {
        read_env("LC_ALL")
            .or_else(|| read_env("LANG"))
            .and_then(|raw| culture_from_locale(&raw))
    }
}

/// Fixed values, for tests and hosts that know the principal up front.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StaticEnvironment {
    /// Reported user name.
    pub user_name: Option<String>,
    /// Reported machine name.
    pub machine_name: Option<String>,
    /// Reported domain name.
    pub domain_name: Option<String>,
    /// Reported culture.
    pub culture: Option<String>,
}

impl StaticEnvironment {
    /// Environment with every field set.
    #[must_use]
    pub fn new(
        user_name: impl Into<String>,
        machine_name: impl Into<String>,
        domain_name: impl Into<String>,
        culture: impl Into<String>,
    ) -> Self {
        Self {
            user_name: Some(user_name.into()),
            machine_name: Some(machine_name.into()),
            domain_name: Some(domain_name.into()),
            culture: Some(culture.into()),
        }
    }
}

impl EnvironmentSource for StaticEnvironment {
    fn user_name(&self) -> Option<String> {
        self.user_name.clone()
    }

    fn machine_name(&self) -> Option<String> {
        self.machine_name.clone()
    }

    fn domain_name(&self) -> Option<String> {
        self.domain_name.clone()
    }

    fn culture(&self) -> Option<String> {
        self.culture.clone()
    }
}

/// Convert a POSIX locale (`en_US.UTF-8@euro`) to a culture tag (`en-US`).
///
/// `C` and `POSIX` map to the invariant culture (empty string).
pub fn culture_from_locale(locale: &str) -> Option<String> {
    let base = locale.split(['.', '@']).next()?.trim();
    if base.is_empty() {
        return None;
    }
    if base == "C" || base == "POSIX" {
        return Some(String::new());
    }
    Some(base.replace('_', "-"))
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn read_hostname_file(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let name = content.trim();
    (!name.is_empty()).then(|| name.to_string())
}
