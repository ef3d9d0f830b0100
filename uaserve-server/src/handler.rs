//! Service dispatch: maps service requests onto the engine.

use crate::error::ServerError;
use crate::metrics::ServerMetrics;
use crate::thumbprint::certificate_thumbprint;
use std::sync::Arc;
use tracing::{debug, warn};
use uaserve_core::session::ChannelInfo;
use uaserve_core::{AttributeId, CoreError, ServerEngine, Session, SessionStatus};
use uaserve_types::monitoring::TimestampsToReturn;
use uaserve_types::service::{
    ActivateSessionParams, ActivateSessionResult, AuthenticationToken, BrowseNextParams,
    BrowseParams, BrowseResult, CreateSessionParams, CreateSessionResult,
    CreateSubscriptionParams, CreateSubscriptionResult, DeleteSubscriptionsParams,
    ModifySubscriptionParams, ModifySubscriptionResult, MonitoredItemCreateRequest,
    MonitoredItemCreateResult, MonitoredItemModifyRequest, MonitoredItemModifyResult, NodeClass,
    NotificationMessage, PublishParams, ReferenceDescription, RepublishParams,
    SetMonitoringModeParams, SetPublishingModeParams,
};
use uaserve_types::StatusCode;

/// The response to a serviced publish request.
pub struct PublishResult {
    /// One status per acknowledgement in the request, in order.
    pub acknowledgement_results: Vec<StatusCode>,
    pub subscription_id: u32,
    pub message: NotificationMessage,
    pub more_notifications: bool,
    pub available_sequence_numbers: Vec<u32>,
}

/// Dispatches service requests against the engine, recording metrics.
///
/// Every post-activation service goes through [`session_for_request`], which
/// enforces the token lookup, channel binding and activation gate in one
/// place.
///
/// [`session_for_request`]: ServiceHandler::session_for_request
pub struct ServiceHandler {
    engine: Arc<ServerEngine>,
    metrics: Arc<ServerMetrics>,
    max_references_per_node: usize,
}

impl ServiceHandler {
    pub fn new(
        engine: Arc<ServerEngine>,
        metrics: Arc<ServerMetrics>,
        max_references_per_node: usize,
    ) -> Self {
        Self {
            engine,
            metrics,
            max_references_per_node: max_references_per_node.max(1),
        }
    }

    pub fn engine(&self) -> &Arc<ServerEngine> {
        &self.engine
    }

    /// Resolves the session for a request and runs the activation and
    /// channel-binding checks.
    fn session_for_request(
        &self,
        token: &AuthenticationToken,
        channel_id: u32,
    ) -> Result<Arc<Session>, ServerError> {
        let session = self.engine.find_session(token)?;
        session.validate_request(channel_id)?;
        Ok(session)
    }

    fn record<T>(&self, operation: &str, result: Result<T, ServerError>) -> Result<T, ServerError> {
        self.metrics.observe_request(operation, result.is_ok());
        if let Err(error) = &result {
            debug!("{} failed: {}", operation, error);
        }
        result
    }

    // --- session services ---

    pub fn create_session(
        &self,
        channel: ChannelInfo,
        params: CreateSessionParams,
    ) -> Result<CreateSessionResult, ServerError> {
        // A transport-supplied thumbprint wins; otherwise hash the
        // certificate carried in the request so transfers can be checked
        let certificate_thumbprint = channel.certificate_thumbprint.or_else(|| {
            params
                .client_certificate
                .as_deref()
                .map(certificate_thumbprint)
        });
        let channel = ChannelInfo {
            certificate_thumbprint,
            ..channel
        };
        let result = self
            .engine
            .create_session(params.session_name, channel, params.requested_timeout_ms)
            .map(|(session, revised_timeout_ms, server_nonce)| {
                self.metrics.sessions_created_total.inc();
                self.metrics
                    .sessions_active
                    .set(self.engine.session_count() as i64);
                CreateSessionResult {
                    session_id: session.session_id().clone(),
                    authentication_token: session.authentication_token(),
                    revised_timeout_ms,
                    server_nonce,
                }
            })
            .map_err(|e| {
                self.metrics.sessions_rejected_total.inc();
                ServerError::from(e)
            });
        self.record("create_session", result)
    }

    pub fn activate_session(
        &self,
        channel: &ChannelInfo,
        token: &AuthenticationToken,
        params: ActivateSessionParams,
    ) -> Result<ActivateSessionResult, ServerError> {
        let result = (|| {
            let session = self.engine.find_session(token)?;
            let server_nonce = session.activate(channel, params.identity_token)?;
            Ok(ActivateSessionResult { server_nonce })
        })();
        self.record("activate_session", result)
    }

    pub fn close_session(
        &self,
        channel_id: u32,
        token: &AuthenticationToken,
    ) -> Result<(), ServerError> {
        let result = (|| {
            let session = self.engine.find_session(token)?;
            // An active session may only be closed from its own channel;
            // a never-activated one may be closed from anywhere
            if session.status() == SessionStatus::Active
                && session.bound_channel_id() != channel_id
            {
                return Err(ServerError::from(CoreError::ChannelMismatch));
            }
            self.engine.close_session(token)?;
            self.metrics
                .sessions_active
                .set(self.engine.session_count() as i64);
            Ok(())
        })();
        self.record("close_session", result)
    }

    // --- subscription services ---

    pub fn create_subscription(
        &self,
        channel_id: u32,
        token: &AuthenticationToken,
        params: CreateSubscriptionParams,
    ) -> Result<CreateSubscriptionResult, ServerError> {
        let result = (|| {
            let session = self.session_for_request(token, channel_id)?;
            let (subscription, (interval, lifetime, keep_alive)) =
                session.create_subscription(&params)?;
            self.metrics.subscriptions_active.inc();
            Ok(CreateSubscriptionResult {
                subscription_id: subscription.id(),
                revised_publishing_interval_ms: interval,
                revised_lifetime_count: lifetime,
                revised_max_keep_alive_count: keep_alive,
            })
        })();
        self.record("create_subscription", result)
    }

    pub fn modify_subscription(
        &self,
        channel_id: u32,
        token: &AuthenticationToken,
        params: ModifySubscriptionParams,
    ) -> Result<ModifySubscriptionResult, ServerError> {
        let result = (|| {
            let session = self.session_for_request(token, channel_id)?;
            let subscription = session.get_subscription(params.subscription_id)?;
            let (interval, lifetime, keep_alive) = subscription.modify(
                params.requested_publishing_interval_ms,
                params.requested_lifetime_count,
                params.requested_max_keep_alive_count,
                params.max_notifications_per_publish,
            );
            Ok(ModifySubscriptionResult {
                revised_publishing_interval_ms: interval,
                revised_lifetime_count: lifetime,
                revised_max_keep_alive_count: keep_alive,
            })
        })();
        self.record("modify_subscription", result)
    }

    pub fn set_publishing_mode(
        &self,
        channel_id: u32,
        token: &AuthenticationToken,
        params: SetPublishingModeParams,
    ) -> Result<Vec<StatusCode>, ServerError> {
        let result = (|| {
            let session = self.session_for_request(token, channel_id)?;
            if params.subscription_ids.is_empty() {
                return Err(ServerError::from(CoreError::NothingToDo));
            }
            Ok(params
                .subscription_ids
                .iter()
                .map(|&id| match session.get_subscription(id) {
                    Ok(subscription) => {
                        subscription.set_publishing_mode(params.publishing_enabled);
                        StatusCode::Good
                    }
                    Err(_) => StatusCode::BadSubscriptionIdInvalid,
                })
                .collect())
        })();
        self.record("set_publishing_mode", result)
    }

    pub fn delete_subscriptions(
        &self,
        channel_id: u32,
        token: &AuthenticationToken,
        params: DeleteSubscriptionsParams,
    ) -> Result<Vec<StatusCode>, ServerError> {
        let result = (|| {
            let session = self.session_for_request(token, channel_id)?;
            if params.subscription_ids.is_empty() {
                return Err(ServerError::from(CoreError::NothingToDo));
            }
            Ok(params
                .subscription_ids
                .iter()
                .map(|&id| match session.delete_subscription(id) {
                    Ok(items) => {
                        self.metrics.subscriptions_active.dec();
                        self.metrics
                            .monitored_items_active
                            .sub(items.len() as i64);
                        for item in items {
                            self.engine.scheduler().unregister(&item);
                        }
                        StatusCode::Good
                    }
                    Err(_) => StatusCode::BadSubscriptionIdInvalid,
                })
                .collect())
        })();
        self.record("delete_subscriptions", result)
    }

    // --- monitored item services ---

    pub fn create_monitored_items(
        &self,
        channel_id: u32,
        token: &AuthenticationToken,
        subscription_id: u32,
        timestamps_to_return: TimestampsToReturn,
        requests: Vec<MonitoredItemCreateRequest>,
    ) -> Result<Vec<MonitoredItemCreateResult>, ServerError> {
        let result = (|| {
            // The activation gate runs before any request-content checks
            let session = self.session_for_request(token, channel_id)?;
            if timestamps_to_return == TimestampsToReturn::Invalid {
                return Err(ServerError::from(CoreError::TimestampsToReturnInvalid));
            }
            if requests.is_empty() {
                return Err(ServerError::from(CoreError::NothingToDo));
            }
            let subscription = session.get_subscription(subscription_id)?;

            Ok(requests
                .into_iter()
                .map(|request| {
                    self.create_one_item(&subscription, timestamps_to_return, request)
                })
                .collect())
        })();
        self.record("create_monitored_items", result)
    }

    fn create_one_item(
        &self,
        subscription: &Arc<uaserve_core::Subscription>,
        timestamps_to_return: TimestampsToReturn,
        request: MonitoredItemCreateRequest,
    ) -> MonitoredItemCreateResult {
        let Some(attribute_id) = AttributeId::from_u32(request.attribute_id) else {
            return MonitoredItemCreateResult::error(StatusCode::BadAttributeIdInvalid);
        };
        let Some(info) = self.engine.accessor().find_object(&request.node_id) else {
            return MonitoredItemCreateResult::error(StatusCode::BadNodeIdUnknown);
        };

        match subscription.create_monitored_item(
            request.node_id,
            attribute_id,
            request.index_range,
            request.monitoring_mode,
            request.params.client_handle,
            request.params.sampling_interval_ms,
            request.params.queue_size,
            request.params.discard_oldest,
            request.params.filter,
            timestamps_to_return,
            info.eu_range.unwrap_or(0.0),
        ) {
            Ok(item) => {
                self.engine.scheduler().register(&item);
                self.metrics.monitored_items_active.inc();
                MonitoredItemCreateResult {
                    status: StatusCode::Good,
                    monitored_item_id: item.id(),
                    revised_sampling_interval_ms: item.sampling_interval_ms(),
                    revised_queue_size: item.revised_queue_size(),
                }
            }
            Err(error) => MonitoredItemCreateResult::error(error.status_code()),
        }
    }

    pub fn modify_monitored_items(
        &self,
        channel_id: u32,
        token: &AuthenticationToken,
        subscription_id: u32,
        timestamps_to_return: TimestampsToReturn,
        requests: Vec<MonitoredItemModifyRequest>,
    ) -> Result<Vec<MonitoredItemModifyResult>, ServerError> {
        let result = (|| {
            let session = self.session_for_request(token, channel_id)?;
            if timestamps_to_return == TimestampsToReturn::Invalid {
                return Err(ServerError::from(CoreError::TimestampsToReturnInvalid));
            }
            if requests.is_empty() {
                return Err(ServerError::from(CoreError::NothingToDo));
            }
            let subscription = session.get_subscription(subscription_id)?;
            subscription.reset_lifetime();

            Ok(requests
                .into_iter()
                .map(|request| {
                    let Some(item) = subscription.get_monitored_item(request.monitored_item_id)
                    else {
                        return MonitoredItemModifyResult::error(
                            StatusCode::BadMonitoredItemIdInvalid,
                        );
                    };
                    // The sampling rate may change; move the item between
                    // rate groups around the modify
                    self.engine.scheduler().unregister(&item);
                    let (interval, queue_size) = item.modify(
                        request.params.client_handle,
                        request.params.sampling_interval_ms,
                        request.params.queue_size,
                        request.params.discard_oldest,
                        request.params.filter,
                        timestamps_to_return,
                    );
                    self.engine.scheduler().register(&item);
                    MonitoredItemModifyResult {
                        status: StatusCode::Good,
                        revised_sampling_interval_ms: interval,
                        revised_queue_size: queue_size,
                    }
                })
                .collect())
        })();
        self.record("modify_monitored_items", result)
    }

    pub fn set_monitoring_mode(
        &self,
        channel_id: u32,
        token: &AuthenticationToken,
        params: SetMonitoringModeParams,
    ) -> Result<Vec<StatusCode>, ServerError> {
        let result = (|| {
            let session = self.session_for_request(token, channel_id)?;
            if params.monitored_item_ids.is_empty() {
                return Err(ServerError::from(CoreError::NothingToDo));
            }
            let subscription = session.get_subscription(params.subscription_id)?;
            subscription.reset_lifetime();
            Ok(params
                .monitored_item_ids
                .iter()
                .map(|&id| match subscription.get_monitored_item(id) {
                    Some(item) => {
                        item.set_monitoring_mode(params.monitoring_mode);
                        StatusCode::Good
                    }
                    None => StatusCode::BadMonitoredItemIdInvalid,
                })
                .collect())
        })();
        self.record("set_monitoring_mode", result)
    }

    pub fn delete_monitored_items(
        &self,
        channel_id: u32,
        token: &AuthenticationToken,
        subscription_id: u32,
        monitored_item_ids: Vec<u32>,
    ) -> Result<Vec<StatusCode>, ServerError> {
        let result = (|| {
            let session = self.session_for_request(token, channel_id)?;
            if monitored_item_ids.is_empty() {
                return Err(ServerError::from(CoreError::NothingToDo));
            }
            let subscription = session.get_subscription(subscription_id)?;
            Ok(monitored_item_ids
                .iter()
                .map(|&id| match subscription.remove_monitored_item(id) {
                    Ok(item) => {
                        self.engine.scheduler().unregister(&item);
                        self.metrics.monitored_items_active.dec();
                        StatusCode::Good
                    }
                    Err(_) => StatusCode::BadMonitoredItemIdInvalid,
                })
                .collect())
        })();
        self.record("delete_monitored_items", result)
    }

    // --- publish pipeline ---

    /// Services a publish request: acknowledgements are processed first,
    /// then the request parks until a subscription produces output.
    pub async fn publish(
        &self,
        channel_id: u32,
        token: &AuthenticationToken,
        params: PublishParams,
    ) -> Result<PublishResult, ServerError> {
        let setup: Result<_, ServerError> = (|| {
            let session = self.session_for_request(token, channel_id)?;
            let acknowledgement_results: Vec<StatusCode> = params
                .subscription_acknowledgements
                .iter()
                .map(|ack| match session.get_subscription(ack.subscription_id) {
                    Ok(subscription) => subscription.acknowledge(ack.sequence_number),
                    Err(_) => StatusCode::BadSubscriptionIdInvalid,
                })
                .collect();
            let receiver = session.publish_engine().enqueue();
            self.metrics
                .publish_pending
                .set(session.publish_engine().pending_count() as i64);
            Ok((acknowledgement_results, receiver))
        })();

        let (acknowledgement_results, receiver) = match setup {
            Ok(v) => v,
            Err(e) => {
                self.metrics.observe_request("publish", false);
                return Err(e);
            }
        };

        let outcome = receiver
            .await
            .map_err(|_| ServerError::from(CoreError::Shutdown))
            .and_then(|r| r.map_err(ServerError::from));

        match outcome {
            Ok(response) => {
                if response.message.is_keep_alive() {
                    self.metrics.keep_alives_total.inc();
                } else {
                    self.metrics
                        .notifications_total
                        .inc_by(response.message.notifications.len() as u64);
                }
                self.metrics.observe_request("publish", true);
                Ok(PublishResult {
                    acknowledgement_results,
                    subscription_id: response.subscription_id,
                    message: response.message,
                    more_notifications: response.more_notifications,
                    available_sequence_numbers: response.available_sequence_numbers,
                })
            }
            Err(error) => {
                self.metrics.observe_request("publish", false);
                warn!("publish failed: {}", error);
                Err(error)
            }
        }
    }

    pub fn republish(
        &self,
        channel_id: u32,
        token: &AuthenticationToken,
        params: RepublishParams,
    ) -> Result<NotificationMessage, ServerError> {
        let result = (|| {
            let session = self.session_for_request(token, channel_id)?;
            let subscription = session.get_subscription(params.subscription_id)?;
            // A republish is client activity for the subscription too
            subscription.reset_lifetime();
            Ok(subscription.republish(params.retransmit_sequence_number)?)
        })();
        self.record("republish", result)
    }

    // --- browse services ---

    pub fn browse(
        &self,
        channel_id: u32,
        token: &AuthenticationToken,
        params: BrowseParams,
    ) -> Result<Vec<BrowseResult>, ServerError> {
        let result = (|| {
            let session = self.session_for_request(token, channel_id)?;
            if params.timestamps_to_return == TimestampsToReturn::Invalid {
                return Err(ServerError::from(CoreError::TimestampsToReturnInvalid));
            }
            if params.nodes_to_browse.is_empty() {
                return Err(ServerError::from(CoreError::NothingToDo));
            }
            // The engine exposes no views; any concrete view id is unknown
            if params.view_id.as_ref().is_some_and(|v| !v.is_null()) {
                return Err(ServerError::ViewUnknown);
            }

            let page_size = effective_page_size(
                params.requested_max_references_per_node,
                self.max_references_per_node,
            );

            Ok(params
                .nodes_to_browse
                .iter()
                .map(|description| {
                    let Some(info) = self.engine.accessor().find_object(&description.node_id)
                    else {
                        return BrowseResult::error(StatusCode::BadNodeIdUnknown);
                    };
                    let references: Vec<ReferenceDescription> = info
                        .references
                        .into_iter()
                        .filter(|reference| {
                            reference_matches(reference, description.reference_type_id.as_ref())
                                && class_matches(reference.node_class, description.node_class_mask)
                        })
                        .collect();
                    match session
                        .continuation_points()
                        .register(page_size, references)
                    {
                        Ok((page, continuation_point)) => BrowseResult {
                            status: StatusCode::Good,
                            continuation_point,
                            references: page,
                        },
                        Err(error) => BrowseResult::error(error.status_code()),
                    }
                })
                .collect())
        })();
        self.record("browse", result)
    }

    pub fn browse_next(
        &self,
        channel_id: u32,
        token: &AuthenticationToken,
        params: BrowseNextParams,
    ) -> Result<Vec<BrowseResult>, ServerError> {
        let result = (|| {
            let session = self.session_for_request(token, channel_id)?;
            if params.continuation_points.is_empty() {
                return Err(ServerError::from(CoreError::NothingToDo));
            }

            Ok(params
                .continuation_points
                .iter()
                .map(|point| {
                    if params.release_continuation_points {
                        match session.continuation_points().cancel(point) {
                            Ok(()) => BrowseResult {
                                status: StatusCode::Good,
                                continuation_point: None,
                                references: Vec::new(),
                            },
                            Err(error) => BrowseResult::error(error.status_code()),
                        }
                    } else {
                        match session.continuation_points().get_next(point) {
                            Ok((page, continuation_point)) => BrowseResult {
                                status: StatusCode::Good,
                                continuation_point,
                                references: page,
                            },
                            Err(error) => BrowseResult::error(error.status_code()),
                        }
                    }
                })
                .collect())
        })();
        self.record("browse_next", result)
    }
}

fn effective_page_size(requested: u32, server_max: usize) -> usize {
    if requested == 0 {
        server_max
    } else {
        (requested as usize).min(server_max)
    }
}

fn reference_matches(
    reference: &ReferenceDescription,
    wanted_type: Option<&uaserve_types::NodeId>,
) -> bool {
    match wanted_type {
        Some(node_id) => &reference.reference_type_id == node_id,
        None => true,
    }
}

fn class_matches(node_class: NodeClass, mask: u32) -> bool {
    if mask == 0 {
        return true;
    }
    let bit = match node_class {
        NodeClass::Object => 1,
        NodeClass::Variable => 2,
        NodeClass::Method => 4,
        NodeClass::ObjectType => 8,
        NodeClass::VariableType => 16,
        NodeClass::ReferenceType => 32,
        NodeClass::DataType => 64,
        NodeClass::View => 128,
    };
    mask & bit != 0
}
