//! Data-source style reads: find exactly one object by filter and flatten it.

use corral_core::{EngineError, EngineResult, Record, RemoteObject, ResourceKind};
use corral_gateway::{typed, Filters};
use corral_mapper::alert::ClusterAlertRuleMapper;
use corral_mapper::auth::AuthConfigMapper;
use corral_mapper::cluster::ClusterMapper;
use corral_mapper::credential::CloudCredentialMapper;
use corral_mapper::node_pool::NodePoolMapper;
use corral_mapper::project::ProjectMapper;
use corral_mapper::Mapper;
use tracing::debug;

use crate::Context;

async fn lookup_as<M: Mapper>(ctx: &Context, filters: &Filters) -> EngineResult<(String, Record)> {
    let mut found = typed::list::<M::Remote>(ctx.gw(), filters).await?;
    debug!(kind = %M::Remote::KIND, matches = found.len(), "lookup");
    let obj = match found.len() {
        0 => return Err(EngineError::LookupNotFound),
        1 => found.remove(0),
        count => return Err(EngineError::LookupAmbiguous { count }),
    };
    let mut record = Record::new();
    M::default().flatten(&obj, &mut record)?;
    Ok((obj.id().to_string(), record))
}

/// List `kind` by `filters` (wire field names) and require exactly one match.
pub async fn lookup(ctx: &Context, kind: ResourceKind, filters: &Filters) -> EngineResult<(String, Record)> {
    match kind {
        ResourceKind::Cluster => lookup_as::<ClusterMapper>(ctx, filters).await,
        ResourceKind::Project => lookup_as::<ProjectMapper>(ctx, filters).await,
        ResourceKind::NodePool => lookup_as::<NodePoolMapper>(ctx, filters).await,
        ResourceKind::CloudCredential => lookup_as::<CloudCredentialMapper>(ctx, filters).await,
        ResourceKind::ClusterAlertRule => lookup_as::<ClusterAlertRuleMapper>(ctx, filters).await,
        ResourceKind::AuthConfig => lookup_as::<AuthConfigMapper>(ctx, filters).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_gateway::MockGateway;
    use serde_json::json;
    use std::sync::Arc;

    fn by_name(name: &str) -> Filters { [("name".to_string(), name.to_string())].into() }

    #[tokio::test]
    async fn exactly_one_match_is_flattened() {
        let gw = MockGateway::new();
        gw.insert(ResourceKind::Project, json!({ "id": "c-1:p-1", "name": "Default", "clusterId": "c-1" }));
        gw.insert(ResourceKind::Project, json!({ "id": "c-2:p-1", "name": "Default", "clusterId": "c-2" }));
        gw.insert(ResourceKind::Project, json!({ "id": "c-1:p-2", "name": "System", "clusterId": "c-1" }));
        let ctx = Context::new(Arc::new(gw));

        let (id, rec) = lookup(&ctx, ResourceKind::Project, &by_name("System")).await.unwrap();
        assert_eq!(id, "c-1:p-2");
        assert_eq!(rec.str_field("cluster_id"), Some("c-1"));

        let err = lookup(&ctx, ResourceKind::Project, &by_name("Default")).await.unwrap_err();
        assert!(matches!(err, EngineError::LookupAmbiguous { count: 2 }));

        let err = lookup(&ctx, ResourceKind::Project, &by_name("Missing")).await.unwrap_err();
        assert!(matches!(err, EngineError::LookupNotFound));
    }
}
