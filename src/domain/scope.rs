use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A flight requirement on a row or sequence entry. `!name` means "only when not exposed".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlightCondition {
    pub name: String,
    pub negated: bool,
}

impl FlightCondition {
    /// Parses `name` or `!name`. Blank input means no condition.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        match raw.strip_prefix('!') {
            Some(name) if !name.trim().is_empty() => Some(Self {
                name: name.trim().to_string(),
                negated: true,
            }),
            Some(_) => None,
            None if raw.is_empty() => None,
            None => Some(Self {
                name: raw.to_string(),
                negated: false,
            }),
        }
    }

    pub fn holds(&self, flights: &BTreeSet<String>) -> bool {
        flights.contains(&self.name) != self.negated
    }
}

impl fmt::Display for FlightCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "!{}", self.name)
        } else {
            f.write_str(&self.name)
        }
    }
}

/// Relative rank of flight and scenario scope when both are set on competing rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopePrecedence {
    #[default]
    FlightFirst,
    ScenarioFirst,
}

/// The {country, flight, scenario} conditions under which a row applies.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Scope {
    /// Lowercased country codes. `None` means every country.
    pub countries: Option<Vec<String>>,
    pub flight: Option<FlightCondition>,
    pub scenario: Option<String>,
    /// Dictionaries named in the countries column before expansion.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub country_groups: Vec<String>,
}

impl Scope {
    pub fn unscoped() -> Self {
        Self::default()
    }

    pub fn for_countries<I, S>(countries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            countries: Some(
                countries
                    .into_iter()
                    .map(|c| c.as_ref().to_ascii_lowercase())
                    .collect(),
            ),
            ..Self::default()
        }
    }

    pub fn with_flight(mut self, flight: FlightCondition) -> Self {
        self.flight = Some(flight);
        self
    }

    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = Some(scenario.into());
        self
    }

    pub fn applies(&self, country: &str, flights: &BTreeSet<String>, scenario: Option<&str>) -> bool {
        let country_ok = self
            .countries
            .as_ref()
            .is_none_or(|list| list.iter().any(|c| c.eq_ignore_ascii_case(country)));
        let flight_ok = self.flight.as_ref().is_none_or(|f| f.holds(flights));
        let scenario_ok = match (&self.scenario, scenario) {
            (None, _) => true,
            (Some(wanted), Some(actual)) => wanted.eq_ignore_ascii_case(actual),
            (Some(_), None) => false,
        };
        country_ok && flight_ok && scenario_ok
    }

    /// Specificity of an applicable row. Compared lexicographically, higher wins.
    pub fn rank(&self, precedence: ScopePrecedence) -> (u8, u8, u8) {
        let flight = u8::from(self.flight.is_some());
        let scenario = u8::from(self.scenario.is_some());
        let country = u8::from(self.countries.is_some());
        match precedence {
            ScopePrecedence::FlightFirst => (flight, scenario, country),
            ScopePrecedence::ScenarioFirst => (scenario, flight, country),
        }
    }

    pub fn is_unscoped(&self) -> bool {
        self.countries.is_none() && self.flight.is_none() && self.scenario.is_none()
    }
}
