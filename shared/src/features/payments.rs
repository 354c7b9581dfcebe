use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use super::{apply_removal, Removed, SyncContext};
use crate::error::{ApiResult, MutationError};
use crate::model::{PaymentMethod, PaymentMethodId};
use crate::mutator::{MutationIntent, OptimisticMutator};
use crate::state::{Lifecycle, ResourceState, ResourceStateMachine};

/// Resource id that serializes default changes; only one can be pending.
const DEFAULT_METHOD: &str = "payment-methods:default";

fn with_default(methods: &[PaymentMethod], id: &PaymentMethodId) -> Vec<PaymentMethod> {
    methods
        .iter()
        .map(|m| PaymentMethod {
            is_default: &m.id == id,
            ..m.clone()
        })
        .collect()
}

pub struct PaymentMethodsController {
    ctx: SyncContext,
    lifecycle: Arc<Lifecycle>,
    state: ResourceStateMachine<Vec<PaymentMethod>>,
    mutator: OptimisticMutator,
}

impl PaymentMethodsController {
    pub fn new(ctx: SyncContext) -> Self {
        let lifecycle = Arc::new(Lifecycle::new());
        let mutator = OptimisticMutator::new(ctx.events.clone(), Arc::clone(&lifecycle));
        Self {
            ctx,
            lifecycle,
            state: ResourceStateMachine::new(),
            mutator,
        }
    }

    pub fn state(&self) -> watch::Receiver<ResourceState<Vec<PaymentMethod>>> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> ResourceState<Vec<PaymentMethod>> {
        self.state.snapshot()
    }

    #[instrument(skip_all)]
    pub async fn load(&self) -> ApiResult<()> {
        if !self.ctx.session.is_authenticated() {
            self.state.require_auth();
            return Ok(());
        }
        self.state.reset();
        self.fetch().await
    }

    pub async fn refresh(&self) -> ApiResult<()> {
        if !self.ctx.session.is_authenticated() {
            self.state.require_auth();
            return Ok(());
        }
        self.state.begin_refresh();
        self.fetch().await
    }

    async fn fetch(&self) -> ApiResult<()> {
        let ticket = self.lifecycle.ticket();
        let result = self.ctx.api.payment_methods().await;
        if !self.lifecycle.is_current(ticket) {
            debug!("discarding payment methods for disposed screen");
            return Ok(());
        }
        let applied = match &result {
            Ok(methods) if methods.is_empty() => self.state.succeed_empty(),
            Ok(methods) => self.state.succeed(methods.clone(), false),
            Err(error) => {
                self.ctx.report_unauthorized(error);
                self.state.fail(error)
            }
        };
        if let Err(e) = applied {
            warn!(error = %e, "payment methods not applied");
        }
        result.map(|_| ())
    }

    fn show(&self, methods: &[PaymentMethod]) {
        let applied = self.state.update_success("show payment methods", |items, _| {
            *items = methods.to_vec();
        });
        if let Err(e) = applied {
            warn!(error = %e, "payment methods not shown");
        }
    }

    /// Marks `id` as the default right away. The server's list replaces the
    /// local one when it sends one back.
    #[instrument(skip_all, fields(method = %id))]
    pub async fn set_default(&self, id: &PaymentMethodId) -> Result<(), MutationError> {
        let Some(current) = self.state.snapshot().data().cloned() else {
            return Err(MutationError::invalid(
                "payment_method",
                "Payment methods are still loading.",
            ));
        };
        let Some(method) = current.iter().find(|m| &m.id == id) else {
            return Err(MutationError::invalid(
                "payment_method",
                "This payment method was removed.",
            ));
        };
        if method.is_default {
            return Ok(());
        }

        let desired = with_default(&current, id);
        let fallback = desired.clone();
        let intent = MutationIntent::new(DEFAULT_METHOD, current, desired);
        let api = &self.ctx.api;
        let outcome = self
            .mutator
            .mutate(
                intent,
                |methods: &Vec<PaymentMethod>| self.show(methods),
                move || async move {
                    api.set_default_payment_method(id)
                        .await
                        .map(|confirmed| confirmed.filter(|list| !list.is_empty()).unwrap_or(fallback))
                },
                "Could not update your default payment method.",
            )
            .await;
        self.ctx.settle(outcome, DEFAULT_METHOD)?;
        Ok(())
    }

    /// Removes the method from the list at once; it returns in place if the
    /// server refuses.
    #[instrument(skip_all, fields(method = %id))]
    pub async fn delete(&self, id: &PaymentMethodId) -> Result<(), MutationError> {
        let Some(removed) = Removed::find(&self.state, id.as_str()) else {
            return Err(MutationError::invalid(
                "payment_method",
                "This payment method was removed.",
            ));
        };

        let intent = MutationIntent::new(id.as_str(), Some(removed), None);
        let api = &self.ctx.api;
        let outcome = self
            .mutator
            .mutate(
                intent,
                |removal: &Option<Removed<PaymentMethod>>| {
                    apply_removal(&self.state, id.as_str(), removal.as_ref());
                },
                move || async move { api.delete_payment_method(id).await.map(|_| None) },
                "Could not remove payment method.",
            )
            .await;
        self.ctx.settle(outcome, id.as_str())?;
        Ok(())
    }

    pub fn dispose(&self) {
        self.lifecycle.dispose();
    }
}
