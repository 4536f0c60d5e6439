// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The closed set of data-plane roles carried in certificate CommonNames.

use std::fmt;
use std::str::FromStr;

/// Who a certificate authorizes its bearer to be at a TLS endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    SwitchListener,
    SwitchClient,
    AdapterListener,
    AdapterClient,
    BenchmarkListener,
    BenchmarkClient,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SwitchListener => "switch-listener",
            Role::SwitchClient => "switch-client",
            Role::AdapterListener => "adapter-listener",
            Role::AdapterClient => "adapter-client",
            Role::BenchmarkListener => "benchmark-listener",
            Role::BenchmarkClient => "benchmark-client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "switch-listener" => Ok(Role::SwitchListener),
            "switch-client" => Ok(Role::SwitchClient),
            "adapter-listener" => Ok(Role::AdapterListener),
            "adapter-client" => Ok(Role::AdapterClient),
            "benchmark-listener" => Ok(Role::BenchmarkListener),
            "benchmark-client" => Ok(Role::BenchmarkClient),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_roundtrip() {
        for role in [
            Role::SwitchListener,
            Role::SwitchClient,
            Role::AdapterListener,
            Role::AdapterClient,
            Role::BenchmarkListener,
            Role::BenchmarkClient,
        ] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn test_role_unknown() {
        assert!("observer".parse::<Role>().is_err());
    }
}
