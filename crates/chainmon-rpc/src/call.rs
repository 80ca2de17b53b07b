//! A single RPC invocation: method name plus positional arguments.

use std::fmt;

use serde_json::Value;

/// Method name and ordered arguments. Built per invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcCall {
    pub method: String,
    pub params: Vec<Value>,
}

impl RpcCall {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: Vec::new(),
        }
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }
}

impl fmt::Display for RpcCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.method)?;
        for param in &self.params {
            write!(f, " {param}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_positional_args() {
        let call = RpcCall::new("getblockstats")
            .arg("00ab")
            .arg(json!(["txs", "total_out"]));
        assert_eq!(call.method, "getblockstats");
        assert_eq!(call.params.len(), 2);
        assert_eq!(call.params[0], json!("00ab"));
    }

    #[test]
    fn display_joins_args() {
        assert_eq!(RpcCall::new("uptime").to_string(), "uptime");
        assert_eq!(
            RpcCall::new("getnetworkhashps").arg(-1).to_string(),
            "getnetworkhashps -1"
        );
        assert_eq!(
            RpcCall::new("getmemoryinfo").arg("stats").to_string(),
            "getmemoryinfo \"stats\""
        );
    }
}
