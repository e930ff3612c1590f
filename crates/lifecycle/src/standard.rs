//! Create, wait for `active`, flatten. Used by kinds without side actions.

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use corral_converge::{CREATE_PENDING, UPDATE_PENDING};
use corral_core::{EngineResult, Record, RemoteObject, ResourceKind};
use corral_gateway::typed;
use corral_mapper::Mapper;
use tracing::info;

use crate::{converge_active, delete_and_wait, read_or_clear, within, Context, Deadline, Orchestrator};

pub struct StandardOrchestrator<M> {
    /// Kinds without a server-side lifecycle (credentials) skip the wait after create/replace.
    converges: bool,
    _mapper: PhantomData<fn() -> M>,
}

impl<M: Mapper> StandardOrchestrator<M> {
    pub fn new() -> Self { Self { converges: true, _mapper: PhantomData } }

    pub fn without_convergence() -> Self { Self { converges: false, _mapper: PhantomData } }

    async fn settle(&self, ctx: &Context, obj: M::Remote, pending: &[&str], deadline: Deadline) -> EngineResult<M::Remote> {
        if !self.converges {
            return Ok(obj);
        }
        let target = ctx.target(pending, &["active"], deadline.remaining(obj.id())?);
        converge_active::<M::Remote>(ctx, obj.id(), &target).await
    }
}

impl<M: Mapper> Default for StandardOrchestrator<M> {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl<M: Mapper> Orchestrator for StandardOrchestrator<M> {
    fn kind(&self) -> ResourceKind { M::Remote::KIND }

    async fn create(&self, ctx: &Context, record: &mut Record, timeout: Duration) -> EngineResult<String> {
        let deadline = Deadline::after(timeout);
        let mapper = M::default();
        let obj = mapper.expand(record)?;
        let name = obj.meta().name.as_str();
        let created = within(ctx, name, deadline.remaining(name)?, typed::create(ctx.gw(), &obj)).await?;
        let id = created.id().to_string();
        info!(%id, "created");
        let active = self.settle(ctx, created, CREATE_PENDING, deadline).await?;
        mapper.flatten(&active, record)?;
        Ok(id)
    }

    async fn read(&self, ctx: &Context, id: &mut Option<String>, record: &mut Record, timeout: Duration) -> EngineResult<()> {
        if let Some(obj) = read_or_clear::<M::Remote>(ctx, id, timeout).await? {
            M::default().flatten(&obj, record)?;
        }
        Ok(())
    }

    async fn update(&self, ctx: &Context, id: &str, _prior: &Record, record: &mut Record, timeout: Duration) -> EngineResult<()> {
        let deadline = Deadline::after(timeout);
        let mapper = M::default();
        let mut obj = mapper.expand(record)?;
        let server = within(ctx, id, deadline.remaining(id)?, typed::read::<M::Remote>(ctx.gw(), id)).await?;
        obj.adopt_server_meta(server.meta());
        let replaced = within(ctx, id, deadline.remaining(id)?, typed::replace(ctx.gw(), &obj)).await?;
        info!(id, "replaced");
        let active = self.settle(ctx, replaced, UPDATE_PENDING, deadline).await?;
        mapper.flatten(&active, record)
    }

    async fn delete(&self, ctx: &Context, id: &mut Option<String>, timeout: Duration) -> EngineResult<()> {
        delete_and_wait::<M::Remote>(ctx, id, timeout).await
    }
}
