use super::prelude::*;
use crate::db::ItemType;

#[derive(Default)]
pub struct AnalyticsQueries;

#[Object]
impl AnalyticsQueries {
    /// Usage overview for the last `days` days
    async fn analytics_dashboard(
        &self,
        ctx: &Context<'_>,
        #[graphql(default = 30)] days: i64,
    ) -> Result<AnalyticsDashboard> {
        let actor = ctx.actor()?;
        Ok(svc(ctx).analytics.dashboard(actor, days).await?.into())
    }

    async fn popular_items(
        &self,
        ctx: &Context<'_>,
        item_type: ItemType,
        #[graphql(default = 10)] limit: i64,
    ) -> Result<Vec<PopularItem>> {
        let rows = svc(ctx).analytics.popular_items(item_type, limit).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
