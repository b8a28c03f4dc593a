//! Pool events replayed from the JSON-lines journal.
//!
//! One event per line, externally tagged:
//!
//! ```text
//! {"submit":{"sender":"0x..","amount":"32000000000000000000"}}
//! {"claim":{"request_id":3,"hint":0}}
//! ```

use serde::{Deserialize, Serialize};
use stakepool_core::types::amount_serde;
use stakepool_core::{Address, ModuleId, ModuleRecord, ModuleStatus, OracleReport};

use crate::error::{KeeperError, KeeperResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolEvent {
    /// Ether deposited by a user
    Submit {
        sender: Address,
        #[serde(with = "amount_serde")]
        amount: u128,
    },

    /// Shares queued for withdrawal
    RequestWithdrawal {
        owner: Address,
        #[serde(with = "amount_serde")]
        shares: u128,
        block: u64,
    },

    /// Finalized request paid out
    Claim {
        request_id: u64,
        #[serde(default)]
        hint: Option<usize>,
    },

    /// Buffered ether moved into modules
    Deposit {
        caller: Address,
        max_deposits: u64,
        block: u64,
    },

    /// Oracle report
    Report { caller: Address, report: OracleReport },

    AddModule { caller: Address, module: ModuleRecord },

    SetModuleStatus {
        caller: Address,
        module_id: ModuleId,
        status: ModuleStatus,
    },

    UpdateModuleFees {
        caller: Address,
        module_id: ModuleId,
        fee_bps: u16,
        treasury_fee_bps: u16,
    },

    /// Key counts published by a module, e.g. newly uploaded keys
    UpdateModuleKeys {
        caller: Address,
        module_id: ModuleId,
        active_keys: u64,
        available_keys: u64,
    },

    UpdateTargetShare {
        caller: Address,
        module_id: ModuleId,
        target_share_bps: u16,
    },
}

impl PoolEvent {
    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            PoolEvent::Submit { .. } => "submit",
            PoolEvent::RequestWithdrawal { .. } => "request_withdrawal",
            PoolEvent::Claim { .. } => "claim",
            PoolEvent::Deposit { .. } => "deposit",
            PoolEvent::Report { .. } => "report",
            PoolEvent::AddModule { .. } => "add_module",
            PoolEvent::SetModuleStatus { .. } => "set_module_status",
            PoolEvent::UpdateModuleFees { .. } => "update_module_fees",
            PoolEvent::UpdateModuleKeys { .. } => "update_module_keys",
            PoolEvent::UpdateTargetShare { .. } => "update_target_share",
        }
    }
}

/// Parse journal `content`, skipping the first `skip` events. Blank lines
/// are ignored and not counted. Returns `(line number, event)` pairs.
pub fn parse_journal(content: &str, skip: u64) -> KeeperResult<Vec<(u64, PoolEvent)>> {
    let mut events = Vec::new();
    let mut seen = 0u64;

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        seen += 1;
        if seen <= skip {
            continue;
        }

        let line_number = index as u64 + 1;
        let event = serde_json::from_str(line).map_err(|e| KeeperError::Journal {
            line: line_number,
            message: e.to_string(),
        })?;
        events.push((line_number, event));
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_journal_skips_applied_events() {
        let content = r#"
{"submit":{"sender":"0x0101010101010101010101010101010101010101","amount":"1000"}}

{"claim":{"request_id":3}}
{"report":{"caller":"0x0202020202020202020202020202020202020202","report":{"ref_block":7,"consensus_balance_delta":-5,"execution_rewards":2}}}
"#;

        let events = parse_journal(content, 1).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], (4, PoolEvent::Claim { request_id: 3, hint: None }));

        let (_, PoolEvent::Report { report, .. }) = &events[1] else {
            panic!("expected report");
        };
        assert_eq!(report.consensus_balance_delta, -5);
        assert!(report.module_keys.is_empty());
    }

    #[test]
    fn test_bad_line_reports_position() {
        let err = parse_journal("{\"claim\":{}}\n", 0).unwrap_err();
        assert!(matches!(err, KeeperError::Journal { line: 1, .. }));
    }
}
