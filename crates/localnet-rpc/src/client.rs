//! HTTP client for one node, implementing both API surfaces.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::api::{ControlPlane, InfoApi};
use crate::encoding::hex_with_checksum;
use crate::error::{RpcError, RpcResult};
use crate::jsonrpc::JsonRpcClient;
use crate::types::{
    u64_from_str_or_num, CreateDomainRequest, DeployWorkloadRequest, Deployment,
    DeploymentStatus, EnrollValidatorRequest, Funding, OperationId, TxStatus, UserPass,
};

const INFO_PATH: &str = "/ext/info";
const KEYSTORE_PATH: &str = "/ext/keystore";
const PLATFORM_PATH: &str = "/ext/P";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for a node's info, keystore and platform APIs.
#[derive(Debug, Clone)]
pub struct NodeClient {
    rpc: JsonRpcClient,
}

impl NodeClient {
    /// Client for the node serving HTTP at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> RpcResult<Self> {
        Ok(Self {
            rpc: JsonRpcClient::new(base_url, timeout)?,
        })
    }

    /// Base URL this client talks to
    pub fn base_url(&self) -> &str {
        self.rpc.base_url()
    }
}

#[derive(Serialize)]
struct NoParams {}

#[derive(Serialize)]
struct ChainParam<'a> {
    chain: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BootstrappedReply {
    is_bootstrapped: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PeersReply {
    #[serde(deserialize_with = "u64_from_str_or_num")]
    num_peers: u64,
}

#[derive(Deserialize)]
struct NodeIdReply {
    #[serde(rename = "nodeID")]
    node_id: String,
}

#[derive(Deserialize)]
struct SuccessReply {
    success: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImportKeyParams<'a> {
    #[serde(flatten)]
    credentials: &'a UserPass,
    private_key: &'a str,
}

#[derive(Deserialize)]
struct AddressReply {
    address: String,
}

#[derive(Serialize)]
struct AddressParam<'a> {
    address: &'a str,
}

#[derive(Deserialize)]
struct BalanceReply {
    #[serde(deserialize_with = "u64_from_str_or_num")]
    balance: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSubnetParams<'a> {
    #[serde(flatten)]
    credentials: &'a UserPass,
    #[serde(flatten)]
    funding: &'a Funding,
    control_keys: &'a [String],
    threshold: u32,
}

#[derive(Serialize)]
struct AddSubnetValidatorParams<'a> {
    #[serde(flatten)]
    credentials: &'a UserPass,
    #[serde(flatten)]
    funding: &'a Funding,
    #[serde(rename = "nodeID")]
    node_id: &'a str,
    #[serde(rename = "subnetID")]
    subnet_id: &'a str,
    #[serde(rename = "startTime")]
    start_time: String,
    #[serde(rename = "endTime")]
    end_time: String,
    weight: String,
}

#[derive(Serialize)]
struct CreateBlockchainParams<'a> {
    #[serde(flatten)]
    credentials: &'a UserPass,
    #[serde(flatten)]
    funding: &'a Funding,
    #[serde(rename = "subnetID")]
    subnet_id: &'a str,
    #[serde(rename = "vmID")]
    vm_id: &'a str,
    #[serde(rename = "fxIDs")]
    fx_ids: &'a [String],
    name: &'a str,
    #[serde(rename = "genesisData")]
    genesis_data: String,
    encoding: &'static str,
}

#[derive(Deserialize)]
struct TxIdReply {
    #[serde(rename = "txID")]
    tx_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TxStatusParams<'a> {
    #[serde(rename = "txID")]
    tx_id: &'a str,
    include_reason: bool,
}

/// Newer nodes wrap the status in an object, older ones return the bare string.
#[derive(Deserialize)]
#[serde(untagged)]
enum TxStatusReply {
    Detailed {
        status: TxStatus,
        #[serde(default)]
        reason: Option<String>,
    },
    Bare(TxStatus),
}

#[derive(Deserialize)]
struct BlockchainsReply {
    blockchains: Vec<Deployment>,
}

#[derive(Serialize)]
struct BlockchainIdParam<'a> {
    #[serde(rename = "blockchainID")]
    blockchain_id: &'a str,
}

#[derive(Deserialize)]
struct StatusReply<S> {
    status: S,
}

#[async_trait]
impl InfoApi for NodeClient {
    async fn is_bootstrapped(&self, partition: &str) -> RpcResult<bool> {
        let reply: BootstrappedReply = self
            .rpc
            .call(INFO_PATH, "info.isBootstrapped", ChainParam { chain: partition })
            .await?;
        Ok(reply.is_bootstrapped)
    }

    async fn peer_count(&self) -> RpcResult<usize> {
        let reply: PeersReply = self.rpc.call(INFO_PATH, "info.peers", NoParams {}).await?;
        usize::try_from(reply.num_peers).map_err(|err| RpcError::Decode {
            method: "info.peers".to_string(),
            reason: err.to_string(),
        })
    }

    async fn node_id(&self) -> RpcResult<String> {
        let reply: NodeIdReply = self
            .rpc
            .call(INFO_PATH, "info.getNodeID", NoParams {})
            .await?;
        Ok(reply.node_id)
    }
}

#[async_trait]
impl ControlPlane for NodeClient {
    async fn create_user(&self, credentials: &UserPass) -> RpcResult<()> {
        let reply: SuccessReply = self
            .rpc
            .call(KEYSTORE_PATH, "keystore.createUser", credentials)
            .await?;
        if reply.success {
            Ok(())
        } else {
            Err(RpcError::Unsuccessful {
                method: "keystore.createUser".to_string(),
                reason: format!("user {} was not created", credentials.username),
            })
        }
    }

    async fn import_key(&self, credentials: &UserPass, private_key: &str) -> RpcResult<String> {
        let reply: AddressReply = self
            .rpc
            .call(
                PLATFORM_PATH,
                "platform.importKey",
                ImportKeyParams {
                    credentials,
                    private_key,
                },
            )
            .await?;
        Ok(reply.address)
    }

    async fn get_balance(&self, address: &str) -> RpcResult<u64> {
        let reply: BalanceReply = self
            .rpc
            .call(PLATFORM_PATH, "platform.getBalance", AddressParam { address })
            .await?;
        Ok(reply.balance)
    }

    async fn create_domain(
        &self,
        credentials: &UserPass,
        request: &CreateDomainRequest,
    ) -> RpcResult<OperationId> {
        let reply: TxIdReply = self
            .rpc
            .call(
                PLATFORM_PATH,
                "platform.createSubnet",
                CreateSubnetParams {
                    credentials,
                    funding: &request.funding,
                    control_keys: &request.control_keys,
                    threshold: request.threshold,
                },
            )
            .await?;
        Ok(reply.tx_id)
    }

    async fn operation_status(&self, operation: &str) -> RpcResult<TxStatus> {
        let reply: TxStatusReply = self
            .rpc
            .call(
                PLATFORM_PATH,
                "platform.getTxStatus",
                TxStatusParams {
                    tx_id: operation,
                    include_reason: true,
                },
            )
            .await?;
        Ok(match reply {
            TxStatusReply::Detailed { status, reason } => {
                if let Some(reason) = reason.filter(|r| !r.is_empty()) {
                    tracing::debug!(operation, ?status, %reason, "operation status");
                }
                status
            }
            TxStatusReply::Bare(status) => status,
        })
    }

    async fn enroll_validator(
        &self,
        credentials: &UserPass,
        request: &EnrollValidatorRequest,
    ) -> RpcResult<OperationId> {
        let reply: TxIdReply = self
            .rpc
            .call(
                PLATFORM_PATH,
                "platform.addSubnetValidator",
                AddSubnetValidatorParams {
                    credentials,
                    funding: &request.funding,
                    node_id: &request.node_id,
                    subnet_id: &request.domain_id,
                    start_time: request.start_time.to_string(),
                    end_time: request.end_time.to_string(),
                    weight: request.weight.to_string(),
                },
            )
            .await?;
        Ok(reply.tx_id)
    }

    async fn deploy_workload(
        &self,
        credentials: &UserPass,
        request: &DeployWorkloadRequest,
    ) -> RpcResult<OperationId> {
        let reply: TxIdReply = self
            .rpc
            .call(
                PLATFORM_PATH,
                "platform.createBlockchain",
                CreateBlockchainParams {
                    credentials,
                    funding: &request.funding,
                    subnet_id: &request.domain_id,
                    vm_id: &request.workload_kind,
                    fx_ids: &request.fx_ids,
                    name: &request.name,
                    genesis_data: hex_with_checksum(&request.genesis),
                    encoding: "hex",
                },
            )
            .await?;
        Ok(reply.tx_id)
    }

    async fn list_deployments(&self) -> RpcResult<Vec<Deployment>> {
        let reply: BlockchainsReply = self
            .rpc
            .call(PLATFORM_PATH, "platform.getBlockchains", NoParams {})
            .await?;
        Ok(reply.blockchains)
    }

    async fn deployment_status(&self, workload_id: &str) -> RpcResult<DeploymentStatus> {
        let reply: StatusReply<DeploymentStatus> = self
            .rpc
            .call(
                PLATFORM_PATH,
                "platform.getBlockchainStatus",
                BlockchainIdParam {
                    blockchain_id: workload_id,
                },
            )
            .await?;
        Ok(reply.status)
    }
}
