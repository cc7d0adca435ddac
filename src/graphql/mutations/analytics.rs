use super::prelude::*;
use crate::db::CreateAnalyticsEvent;

#[derive(Default)]
pub struct AnalyticsMutations;

#[Object]
impl AnalyticsMutations {
    /// Record a client-side event such as a page view
    async fn track_event(
        &self,
        ctx: &Context<'_>,
        input: TrackEventInput,
    ) -> Result<AnalyticsEventResult> {
        let actor = ctx.try_actor();
        let mut event = CreateAnalyticsEvent::new(input.event_type, None);
        event.session_id = input.session_id;
        event.page_url = input.page_url;
        event.search_query = input.search_query;
        event.book_id = input.book_id;
        event.document_id = input.document_id;
        event.referrer = input.referrer;
        if let Some(metadata) = input.metadata {
            event.metadata = metadata.0;
        }
        if let Some(client) = ctx.data_opt::<ClientInfo>() {
            event.ip_address = client.ip_address.clone();
            event.user_agent = client.user_agent.clone();
        }

        let result = svc(ctx).analytics.track_event(actor, event).await;
        finish(result, |e| AnalyticsEventResult::success(e.into()))
    }
}
