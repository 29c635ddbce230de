use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use locus_core::protocol::{call, CenterReply, CenterRequest};
use locus_core::{Key, RpcError};
use locus_wire::{Address, Network};

/// Typed client for a center, used by workers and pools.
#[derive(Clone)]
pub struct CenterClient {
    network: Arc<dyn Network>,
    center: Address,
}

impl CenterClient {
    pub fn new(network: Arc<dyn Network>, center: Address) -> Self {
        Self { network, center }
    }

    pub fn address(&self) -> &Address {
        &self.center
    }

    pub async fn register(&self, address: &Address, ncores: u32) -> Result<(), RpcError> {
        self.ack(CenterRequest::Register {
            address: address.clone(),
            ncores,
        })
        .await
    }

    pub async fn deregister(&self, address: &Address) -> Result<(), RpcError> {
        self.ack(CenterRequest::Deregister {
            address: address.clone(),
        })
        .await
    }

    /// Report that `address` now holds `keys`.
    pub async fn add_keys(&self, address: &Address, keys: Vec<Key>) -> Result<(), RpcError> {
        self.ack(CenterRequest::AddKeys {
            address: address.clone(),
            keys,
        })
        .await
    }

    /// Report that `address` dropped `keys`.
    pub async fn remove_keys(&self, address: &Address, keys: Vec<Key>) -> Result<(), RpcError> {
        self.ack(CenterRequest::RemoveKeys {
            address: address.clone(),
            keys,
        })
        .await
    }

    pub async fn who_has(
        &self,
        keys: Option<Vec<Key>>,
    ) -> Result<HashMap<Key, BTreeSet<Address>>, RpcError> {
        match self.call(CenterRequest::WhoHas { keys }).await? {
            CenterReply::WhoHas(map) => Ok(map),
            other => Err(unexpected("who_has", &other)),
        }
    }

    pub async fn has_what(&self, address: &Address) -> Result<BTreeSet<Key>, RpcError> {
        let request = CenterRequest::HasWhat {
            address: address.clone(),
        };
        match self.call(request).await? {
            CenterReply::HasWhat(keys) => Ok(keys),
            other => Err(unexpected("has_what", &other)),
        }
    }

    pub async fn ncores(&self) -> Result<BTreeMap<Address, u32>, RpcError> {
        match self.call(CenterRequest::Ncores).await? {
            CenterReply::Ncores(map) => Ok(map),
            other => Err(unexpected("ncores", &other)),
        }
    }

    /// Ask the center to stop serving.
    pub async fn terminate(&self) -> Result<(), RpcError> {
        self.ack(CenterRequest::Terminate).await
    }

    async fn call(&self, request: CenterRequest) -> Result<CenterReply, RpcError> {
        call(self.network.as_ref(), &self.center, &request).await
    }

    async fn ack(&self, request: CenterRequest) -> Result<(), RpcError> {
        let op = locus_core::Rpc::op(&request);
        match self.call(request).await? {
            CenterReply::Ack => Ok(()),
            other => Err(unexpected(op, &other)),
        }
    }
}

fn unexpected(op: &'static str, reply: &CenterReply) -> RpcError {
    RpcError::Protocol {
        op,
        got: format!("{reply:?}"),
    }
}
