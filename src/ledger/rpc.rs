use reqwest::{Client, StatusCode};
use rocket::serde::json::{json, serde_json, Value};
use serde::Deserialize;

use super::{Confirmation, Finality, LedgerFault, LedgerNode, LedgerOperation, LedgerOutput};

/// A ledger node reached over JSON-RPC.
///
/// The node exposes the voting contract's methods directly: writes answer
/// with a transaction receipt, reads with the requested record.
pub struct HttpLedgerNode {
    client: Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxReceipt {
    tx_hash: String,
    status: Finality,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CandidateRecord {
    name: String,
    vote_count: u64,
}

/// JSON-RPC "internal error".
const RPC_INTERNAL_ERROR: i64 = -32603;
/// JSON-RPC "parse error".
const RPC_PARSE_ERROR: i64 = -32700;

impl HttpLedgerNode {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

/// The contract method and positional parameters for an operation.
fn rpc_call(operation: &LedgerOperation) -> (&'static str, Value) {
    match operation {
        LedgerOperation::RegisterCandidate {
            election,
            candidate,
            name,
        } => ("addCandidate", json!([election, candidate, name])),
        LedgerOperation::RegisterVoter { address } => ("registerVoter", json!([address])),
        LedgerOperation::StartElection { election } => ("startElection", json!([election])),
        LedgerOperation::CastVote {
            election,
            candidate,
            voter_address,
        } => ("vote", json!([election, candidate, voter_address])),
        LedgerOperation::ReadTally {
            election,
            candidate,
        } => ("getCandidate", json!([election, candidate])),
        LedgerOperation::ReadCandidateCount { election } => {
            ("getCandidatesCount", json!([election]))
        }
    }
}

fn malformed(err: serde_json::Error) -> LedgerFault {
    LedgerFault::Rpc {
        code: RPC_PARSE_ERROR,
        message: format!("malformed result: {err}"),
    }
}

/// Interpret the `result` member of a successful response.
fn confirmation_from_result(
    operation: &LedgerOperation,
    result: Value,
) -> Result<Confirmation, LedgerFault> {
    match operation {
        LedgerOperation::ReadTally { .. } => {
            let record: CandidateRecord = serde_json::from_value(result).map_err(malformed)?;
            Ok(Confirmation::read(LedgerOutput::Tally {
                name: record.name,
                votes: record.vote_count,
            }))
        }
        LedgerOperation::ReadCandidateCount { .. } => {
            let count: u64 = serde_json::from_value(result).map_err(malformed)?;
            Ok(Confirmation::read(LedgerOutput::CandidateCount(count)))
        }
        _ => {
            let receipt: TxReceipt = serde_json::from_value(result).map_err(malformed)?;
            Ok(Confirmation::applied(receipt.tx_hash, receipt.status))
        }
    }
}

fn transport_fault(err: reqwest::Error) -> LedgerFault {
    if err.is_timeout() {
        LedgerFault::Timeout
    } else if err.is_decode() {
        LedgerFault::Rpc {
            code: RPC_PARSE_ERROR,
            message: err.to_string(),
        }
    } else {
        LedgerFault::Transport(err.to_string())
    }
}

#[rocket::async_trait]
impl LedgerNode for HttpLedgerNode {
    async fn execute(&self, operation: &LedgerOperation) -> Result<Confirmation, LedgerFault> {
        let (method, params) = rpc_call(operation);
        let body = json!({
            "jsonrpc": "2.0",
            "id": rand::random::<u32>(),
            "method": method,
            "params": params,
        });
        trace!("Ledger RPC {method} {params}");

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(transport_fault)?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => return Err(LedgerFault::RateLimited),
            status if status.is_server_error() => {
                return Err(LedgerFault::Transport(format!("node answered {status}")))
            }
            status if !status.is_success() => {
                return Err(LedgerFault::Rpc {
                    code: i64::from(status.as_u16()),
                    message: format!("node answered {status}"),
                })
            }
            _ => {}
        }

        let response: RpcResponse = response.json().await.map_err(transport_fault)?;
        if let Some(error) = response.error {
            return Err(LedgerFault::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        let result = response.result.ok_or_else(|| LedgerFault::Rpc {
            code: RPC_INTERNAL_ERROR,
            message: "response carried neither result nor error".to_string(),
        })?;
        confirmation_from_result(operation, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operations_map_to_contract_methods() {
        let (method, params) = rpc_call(&LedgerOperation::CastVote {
            election: 4,
            candidate: 2,
            voter_address: "0xabc".to_string(),
        });
        assert_eq!(method, "vote");
        assert_eq!(params, json!([4, 2, "0xabc"]));

        let (method, params) = rpc_call(&LedgerOperation::RegisterCandidate {
            election: 4,
            candidate: 1,
            name: "Alice".to_string(),
        });
        assert_eq!(method, "addCandidate");
        assert_eq!(params, json!([4, 1, "Alice"]));

        let (method, _) = rpc_call(&LedgerOperation::ReadCandidateCount { election: 4 });
        assert_eq!(method, "getCandidatesCount");
    }

    #[test]
    fn receipts_carry_finality() {
        let confirmation = confirmation_from_result(
            &LedgerOperation::StartElection { election: 1 },
            json!({"txHash": "0x01", "status": "accepted"}),
        )
        .unwrap();
        assert_eq!(confirmation.tx_ref.as_deref(), Some("0x01"));
        assert_eq!(confirmation.finality, Finality::Accepted);
        assert_eq!(confirmation.output, LedgerOutput::Applied);
    }

    #[test]
    fn reads_are_decoded() {
        let confirmation = confirmation_from_result(
            &LedgerOperation::ReadTally {
                election: 1,
                candidate: 1,
            },
            json!({"name": "Alice", "voteCount": 7}),
        )
        .unwrap();
        assert_eq!(
            confirmation.output,
            LedgerOutput::Tally {
                name: "Alice".to_string(),
                votes: 7
            }
        );

        let confirmation = confirmation_from_result(
            &LedgerOperation::ReadCandidateCount { election: 1 },
            json!(3),
        )
        .unwrap();
        assert_eq!(confirmation.output, LedgerOutput::CandidateCount(3));
    }

    #[test]
    fn malformed_results_are_rpc_faults() {
        let fault = confirmation_from_result(
            &LedgerOperation::ReadCandidateCount { election: 1 },
            json!("three"),
        )
        .unwrap_err();
        assert!(matches!(fault, LedgerFault::Rpc { code: RPC_PARSE_ERROR, .. }));
    }
}
