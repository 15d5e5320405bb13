// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Central wiring: assembles the registries, collaborators, and the
//! dispatcher into the one value every transport handler closes over (§9
//! design note — an explicit, constructor-injected value rather than
//! ambient statics, so multiple logical instances can share a process).

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::collaborators::{AuthValidator, GroupDirectory, KvStore, PubSubBus};
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::instance::InstanceState;
use crate::membership::MembershipResolver;
use crate::registry::room::RoomRegistry;
use crate::registry::session::SessionRegistry;

pub struct App {
    pub config: Config,
    pub instance: Arc<InstanceState>,
    pub sessions: Arc<SessionRegistry>,
    pub rooms: Arc<RoomRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub membership: Arc<MembershipResolver>,
    pub auth: Arc<dyn AuthValidator>,
    pub groups: Arc<dyn GroupDirectory>,
    pub bus: Arc<dyn PubSubBus>,
    pub kv: Arc<dyn KvStore>,
    pub shutdown: CancellationToken,
}

impl App {
    pub async fn new(
        config: Config,
        auth: Arc<dyn AuthValidator>,
        groups: Arc<dyn GroupDirectory>,
        bus: Arc<dyn PubSubBus>,
        kv: Arc<dyn KvStore>,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let instance = Arc::new(InstanceState::new());
        let sessions = Arc::new(SessionRegistry::new());
        let rooms = Arc::new(RoomRegistry::new());
        let dispatcher =
            Arc::new(Dispatcher::new(Arc::clone(&instance), Arc::clone(&sessions), Arc::clone(&rooms), Arc::clone(&bus)));

        let sink: Arc<dyn crate::registry::room::RoomEventSink> = Arc::clone(&dispatcher) as _;
        rooms.attach_sink(Arc::downgrade(&sink)).await;

        let membership = Arc::new(MembershipResolver::new(
            Arc::clone(&rooms),
            Arc::clone(&sessions),
            Arc::clone(&groups),
            Arc::clone(&dispatcher),
            config.group_query_timeout(),
        ));

        Arc::new(Self { config, instance, sessions, rooms, dispatcher, membership, auth, groups, bus, kv, shutdown })
    }
}
