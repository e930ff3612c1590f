//! Auth configs are server-side singletons: "create" and "update" replace the provider's config
//! with `enabled=true`, "delete" invokes `disable`.

use std::time::Duration;

use async_trait::async_trait;
use corral_core::{EngineError, EngineResult, Record, RemoteObject, ResourceKind};
use corral_gateway::typed;
use corral_mapper::auth::{AuthConfig, AuthConfigMapper};
use corral_mapper::Mapper;
use tracing::info;

use crate::{action_with_retry, read_or_clear, within, Context, Deadline, Orchestrator};

pub const DISABLE: &str = "disable";

#[derive(Debug, Default)]
pub struct AuthConfigOrchestrator;

impl AuthConfigOrchestrator {
    async fn enable(&self, ctx: &Context, record: &mut Record, timeout: Duration) -> EngineResult<String> {
        let mut cfg = AuthConfigMapper.expand(record)?;
        cfg.common_mut().enabled = true;
        let id = cfg.provider().to_string();
        let deadline = Deadline::after(timeout);
        let server = within(ctx, &id, deadline.remaining(&id)?, typed::read::<AuthConfig>(ctx.gw(), &id)).await?;
        cfg.adopt_server_meta(server.meta());
        within(ctx, &id, deadline.remaining(&id)?, typed::replace(ctx.gw(), &cfg)).await?;

        let after = within(ctx, &id, deadline.remaining(&id)?, typed::read::<AuthConfig>(ctx.gw(), &id)).await?;
        if !after.common().enabled {
            return Err(EngineError::validation(format!("auth provider {} is still disabled after replace", id)));
        }
        info!(%id, "auth provider enabled");
        AuthConfigMapper.flatten(&after, record)?;
        Ok(id)
    }
}

#[async_trait]
impl Orchestrator for AuthConfigOrchestrator {
    fn kind(&self) -> ResourceKind { ResourceKind::AuthConfig }

    async fn create(&self, ctx: &Context, record: &mut Record, timeout: Duration) -> EngineResult<String> {
        self.enable(ctx, record, timeout).await
    }

    async fn read(&self, ctx: &Context, id: &mut Option<String>, record: &mut Record, timeout: Duration) -> EngineResult<()> {
        match read_or_clear::<AuthConfig>(ctx, id, timeout).await? {
            Some(cfg) if cfg.common().enabled => AuthConfigMapper.flatten(&cfg, record),
            Some(cfg) => {
                info!(id = cfg.id(), "auth provider disabled, clearing identity");
                *id = None;
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn update(&self, ctx: &Context, _id: &str, _prior: &Record, record: &mut Record, timeout: Duration) -> EngineResult<()> {
        self.enable(ctx, record, timeout).await.map(|_| ())
    }

    async fn delete(&self, ctx: &Context, id: &mut Option<String>, timeout: Duration) -> EngineResult<()> {
        let Some(current) = id.clone() else { return Ok(()) };
        match action_with_retry::<AuthConfig, _>(ctx, &current, DISABLE, |_| Ok(None)).await {
            Ok(_) => {}
            Err(e) if e.is_absent() => {
                *id = None;
                return Ok(());
            }
            Err(e) => return Err(e),
        }
        let after = within(ctx, &current, timeout, typed::read::<AuthConfig>(ctx.gw(), &current)).await?;
        if after.common().enabled {
            return Err(EngineError::validation(format!("auth provider {} is still enabled after disable", current)));
        }
        info!(id = %current, "auth provider disabled");
        *id = None;
        Ok(())
    }
}
