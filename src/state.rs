use parking_lot::Mutex;
use std::sync::Arc;
use sysinfo::System;

use crate::config::{Config, Limits};
use crate::db::{DurableStore, MembershipChecker};
use crate::services::auth_service::AuthVerifier;
use crate::ws::ratelimit::ChatRateLimiter;
use crate::ws::registry::SessionRegistry;
use crate::ws::timer::DelayTimer;
use crate::ws::transport::ConnectionTransport;

/// Everything the gateway and the HTTP routes share. Built once in `main`
/// (or per test) and passed around behind an `Arc`.
pub struct AppState {
    pub config: Config,
    pub limits: Limits,
    pub registry: SessionRegistry,
    pub transport: ConnectionTransport,
    pub chat_limiter: ChatRateLimiter,
    pub auth: Arc<dyn AuthVerifier>,
    pub membership: Arc<dyn MembershipChecker>,
    pub store: Arc<dyn DurableStore>,
    /// Host monitor sampled by the diagnostics endpoint.
    pub system: Mutex<System>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn DurableStore>,
        membership: Arc<dyn MembershipChecker>,
        auth: Arc<dyn AuthVerifier>,
        timer: Arc<dyn DelayTimer>,
    ) -> Self {
        let limits = config.limits();
        Self {
            registry: SessionRegistry::new(store.clone(), timer, limits.persist_debounce),
            transport: ConnectionTransport::new(limits.outbound_queue),
            chat_limiter: ChatRateLimiter::new(limits.chat_rate_max, limits.chat_rate_window),
            config,
            limits,
            auth,
            membership,
            store,
            system: Mutex::new(System::new()),
        }
    }
}
