//! # Per-Object Processing
//!
//! The loop every atomic plugin runs inside `execute`: for each reference,
//! create one report item, mark it in flight, load the object, run the plugin's
//! logic and record exactly one outcome.
//!
//! Object-level errors stop at the object boundary. Only an infrastructure
//! error escapes, so the engine can retry the unfinished rest of the batch.

use super::context::BatchContext;
use super::errors::{PluginError, PluginResult};
use super::plugin::PluginInfo;
use crate::models::{LiteReference, PluginState, ReportItem, StoredObject};
use async_trait::async_trait;
use tracing::{debug, warn};

#[async_trait]
pub trait ObjectProcessor: Send + Sync {
    /// Work on one loaded object.
    ///
    /// `Ok` records SUCCESS, `PartialObject` records PARTIAL_SUCCESS, `Infrastructure`
    /// aborts the batch, anything else records FAILURE. The error text goes into
    /// the item details.
    async fn process_object(
        &self,
        ctx: &BatchContext,
        object: StoredObject,
        item: &mut ReportItem,
    ) -> Result<(), PluginError>;
}

pub async fn process_objects<P>(
    ctx: &BatchContext,
    plugin: &PluginInfo,
    batch: Vec<LiteReference>,
    processor: &P,
) -> PluginResult<()>
where
    P: ObjectProcessor + ?Sized,
{
    for reference in batch {
        if ctx.is_finished(&reference.id) {
            continue;
        }

        let mut item = ctx.new_item(plugin, &reference);

        if let Some(cause) = &reference.cause {
            item.add_details(format!("Could not resolve {reference}: {cause}"));
            finish(ctx, item, PluginState::Failure).await;
            continue;
        }

        ctx.report_partial(&item).await;

        let result = match ctx
            .job()
            .model()
            .load(&reference.object_type, &reference.id)
            .await
        {
            Ok(object) => processor.process_object(ctx, object, &mut item).await,
            Err(error) => Err(PluginError::from(error)),
        };

        match result {
            Ok(()) => finish(ctx, item, PluginState::Success).await,
            Err(PluginError::PartialObject(details)) => {
                item.add_details(details);
                finish(ctx, item, PluginState::PartialSuccess).await;
            }
            Err(error @ PluginError::Infrastructure(_)) => {
                warn!(
                    job_id = %ctx.job_id(),
                    object_id = %reference.id,
                    error = %error,
                    "Infrastructure failure, abandoning rest of batch"
                );
                return Err(error);
            }
            Err(error) => {
                item.add_details(error.to_string());
                finish(ctx, item, PluginState::Failure).await;
            }
        }
    }
    Ok(())
}

async fn finish(ctx: &BatchContext, mut item: ReportItem, state: PluginState) {
    if let Err(error) = item.set_outcome(state) {
        warn!(error = %error, "Processor already settled the report item");
    }
    debug!(
        job_id = %ctx.job_id(),
        object_id = ?item.source_object_id,
        state = %item.state(),
        "Object processed"
    );
    ctx.record_outcome(item).await;
}
