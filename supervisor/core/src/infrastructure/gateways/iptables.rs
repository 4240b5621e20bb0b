// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Rendering of iptables command lines for the network gateway.
//
// An entry describes one chain: its default policy and zero or more rule
// records. INPUT rules match on source (-s/--sport*), OUTPUT rules on
// destination (-d/--dport*). A rule without protocols renders a single line
// with `-p all`; otherwise one line per protocol is emitted.

use crate::domain::gateway::GatewayError;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chain {
    Input,
    Output,
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chain::Input => write!(f, "INPUT"),
            Chain::Output => write!(f, "OUTPUT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Accept,
    Drop,
    Reject,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Accept => write!(f, "ACCEPT"),
            Target::Drop => write!(f, "DROP"),
            Target::Reject => write!(f, "REJECT"),
        }
    }
}

impl Target {
    fn parse(value: &str) -> Result<Self, GatewayError> {
        match value {
            "ACCEPT" => Ok(Target::Accept),
            "DROP" => Ok(Target::Drop),
            "REJECT" => Ok(Target::Reject),
            other => Err(GatewayError::Config(format!(
                "unknown iptables target '{other}'"
            ))),
        }
    }
}

/// A port match: nothing, a single port, or a multiport list/range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ports {
    pub any: bool,
    pub multiport: bool,
    pub value: String,
}

impl Ports {
    pub fn none() -> Self {
        Self {
            any: true,
            multiport: false,
            value: String::new(),
        }
    }

    pub fn single(value: impl Into<String>) -> Self {
        Self {
            any: false,
            multiport: false,
            value: value.into(),
        }
    }

    pub fn multi(value: impl Into<String>) -> Self {
        Self {
            any: false,
            multiport: true,
            value: value.into(),
        }
    }
}

/// One rule record within a chain entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub host: String,
    pub ports: Ports,
    pub protocols: Vec<String>,
    pub target: Target,
}

/// One chain's policy and rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpTableEntry {
    pub chain: Chain,
    pub default_target: Target,
    pub rules: Vec<Rule>,
}

impl IpTableEntry {
    /// The `iptables -P` line installing the chain's default policy.
    pub fn interpret_policy(&self) -> String {
        format!("iptables -P {} {}", self.chain, self.default_target)
    }

    /// The `iptables -A` lines for one rule: a single `-p all` line when the
    /// rule names no protocols, otherwise one line per protocol.
    pub fn interpret_rule(&self, rule: &Rule) -> Vec<String> {
        if rule.protocols.is_empty() {
            vec![self.render(rule, None)]
        } else {
            rule.protocols
                .iter()
                .map(|protocol| self.render(rule, Some(protocol)))
                .collect()
        }
    }

    /// All command lines for this entry: rules first, policy last.
    pub fn command_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .rules
            .iter()
            .flat_map(|rule| self.interpret_rule(rule))
            .collect();
        lines.push(self.interpret_policy());
        lines
    }

    fn render(&self, rule: &Rule, protocol: Option<&str>) -> String {
        let mut line = format!("iptables -A {}", self.chain);

        match self.chain {
            Chain::Input => line.push_str(&format!(" -s {}", rule.host)),
            Chain::Output => line.push_str(&format!(" -d {}", rule.host)),
        }

        line.push_str(&format!(" -p {}", protocol.unwrap_or("all")));

        if !rule.ports.any {
            let direction = match self.chain {
                Chain::Input => "sport",
                Chain::Output => "dport",
            };
            if rule.ports.multiport {
                line.push_str(&format!(
                    " --match multiport --{}s {}",
                    direction, rule.ports.value
                ));
            } else {
                line.push_str(&format!(" --{} {}", direction, rule.ports.value));
            }
        }

        line.push_str(&format!(" -j {}", rule.target));
        line
    }
}

/// Parse one entry object from the network gateway's `rules` array:
///
/// ```json
/// { "chain": "INPUT", "default-target": "DROP",
///   "rules": [ { "host": "10.0.3.0/24", "ports": "80,8080",
///                "protocols": ["tcp"], "target": "ACCEPT" } ] }
/// ```
pub fn parse_entry(value: &Value) -> Result<IpTableEntry, GatewayError> {
    let object = value
        .as_object()
        .ok_or_else(|| GatewayError::Config("iptables entry is not an object".to_string()))?;

    let chain = match object.get("chain").and_then(Value::as_str) {
        Some("INPUT") => Chain::Input,
        Some("OUTPUT") => Chain::Output,
        Some(other) => {
            return Err(GatewayError::Config(format!(
                "unknown iptables chain '{other}'"
            )))
        }
        None => {
            return Err(GatewayError::Config(
                "iptables entry is missing 'chain'".to_string(),
            ))
        }
    };

    let default_target = match object.get("default-target").and_then(Value::as_str) {
        Some(target) => Target::parse(target)?,
        None => Target::Accept,
    };

    let mut rules = Vec::new();
    if let Some(raw_rules) = object.get("rules") {
        let raw_rules = raw_rules
            .as_array()
            .ok_or_else(|| GatewayError::Config("'rules' is not an array".to_string()))?;
        for raw_rule in raw_rules {
            rules.push(parse_rule(raw_rule)?);
        }
    }

    Ok(IpTableEntry {
        chain,
        default_target,
        rules,
    })
}

fn parse_rule(value: &Value) -> Result<Rule, GatewayError> {
    let object = value
        .as_object()
        .ok_or_else(|| GatewayError::Config("iptables rule is not an object".to_string()))?;

    let host = object
        .get("host")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::Config("iptables rule is missing 'host'".to_string()))?
        .to_string();

    let ports = match object.get("ports") {
        None => Ports::none(),
        Some(Value::Number(number)) => Ports::single(number.to_string()),
        Some(Value::String(spec)) => {
            if spec.contains(',') || spec.contains(':') {
                Ports::multi(spec.clone())
            } else {
                Ports::single(spec.clone())
            }
        }
        Some(_) => {
            return Err(GatewayError::Config(
                "'ports' must be a number or a string".to_string(),
            ))
        }
    };

    let protocols = match object.get("protocols") {
        None => Vec::new(),
        Some(Value::String(protocol)) => vec![protocol.clone()],
        Some(Value::Array(entries)) => {
            let mut protocols = Vec::with_capacity(entries.len());
            for entry in entries {
                match entry.as_str() {
                    Some(protocol) => protocols.push(protocol.to_string()),
                    None => {
                        return Err(GatewayError::Config(
                            "'protocols' entries must be strings".to_string(),
                        ))
                    }
                }
            }
            protocols
        }
        Some(_) => {
            return Err(GatewayError::Config(
                "'protocols' must be a string or an array".to_string(),
            ))
        }
    };

    let target = object
        .get("target")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::Config("iptables rule is missing 'target'".to_string()))
        .and_then(Target::parse)?;

    Ok(Rule {
        host,
        ports,
        protocols,
        target,
    })
}
