use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Canonical identifiers of the intelligence sources the executor can fan out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    Shodan,
    Censys,
    Virustotal,
    Hunter,
    Whois,
    Crtsh,
}

impl SourceId {
    pub const ALL: [Self; 6] = [
        Self::Shodan,
        Self::Censys,
        Self::Virustotal,
        Self::Hunter,
        Self::Whois,
        Self::Crtsh,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Shodan => "shodan",
            Self::Censys => "censys",
            Self::Virustotal => "virustotal",
            Self::Hunter => "hunter",
            Self::Whois => "whois",
            Self::Crtsh => "crtsh",
        }
    }

    /// Upper-case name used in `RECONFLUX_<NAME>_*` configuration variables.
    pub const fn env_name(self) -> &'static str {
        match self {
            Self::Shodan => "SHODAN",
            Self::Censys => "CENSYS",
            Self::Virustotal => "VIRUSTOTAL",
            Self::Hunter => "HUNTER",
            Self::Whois => "WHOIS",
            Self::Crtsh => "CRTSH",
        }
    }

    /// Environment variables holding this source's credential, primary key first.
    ///
    /// Empty for sources that are queried anonymously.
    pub const fn credential_vars(self) -> &'static [&'static str] {
        match self {
            Self::Shodan => &["SHODAN_API_KEY"],
            Self::Censys => &["CENSYS_API_ID", "CENSYS_API_SECRET"],
            Self::Virustotal => &["VIRUSTOTAL_API_KEY"],
            Self::Hunter => &["HUNTER_API_KEY"],
            Self::Whois | Self::Crtsh => &[],
        }
    }

    /// Parse a comma separated list such as `shodan,crtsh`, rejecting unknown names.
    pub fn parse_list(value: &str) -> Result<Vec<Self>, ValidationError> {
        let sources = value
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(Self::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        if sources.is_empty() {
            return Err(ValidationError::EmptySourceList);
        }
        Ok(sources)
    }
}

impl Display for SourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "shodan" => Ok(Self::Shodan),
            "censys" => Ok(Self::Censys),
            "virustotal" => Ok(Self::Virustotal),
            "hunter" => Ok(Self::Hunter),
            "whois" => Ok(Self::Whois),
            "crtsh" | "crt.sh" => Ok(Self::Crtsh),
            other => Err(ValidationError::InvalidSource {
                value: other.to_owned(),
            }),
        }
    }
}
