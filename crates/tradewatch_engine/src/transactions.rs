use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr, PickFirst};
use tradewatch_core::{
    Currency, Direction, HighWaterMark, ItemRef, Page, Party, SyncWalk, Transaction, WalkStep,
};
use tradewatch_logging::{watch_debug, watch_trace};

use crate::settings::endpoint;
use crate::{Endpoints, Error, PageSource, PreparedRequest, ResultExt, Session, Updates};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionPageWire {
    #[serde(default)]
    next_page_cursor: Option<String>,
    #[serde(default)]
    data: Vec<TransactionWire>,
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionWire {
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    id: i64,
    created: DateTime<Utc>,
    #[serde(default)]
    is_pending: bool,
    agent: ReferenceWire,
    details: ReferenceWire,
    currency: CurrencyWire,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct ReferenceWire {
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    id: i64,
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct CurrencyWire {
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    amount: i64,
    #[serde(rename = "type", default)]
    kind: String,
}

impl TransactionWire {
    fn into_transaction(self, direction: Direction) -> Transaction {
        Transaction {
            id: self.id,
            created: self.created,
            agent: Party {
                id: self.agent.id,
                name: self.agent.name,
                kind: self.agent.kind,
            },
            item: ItemRef {
                id: self.details.id,
                name: self.details.name,
                kind: self.details.kind,
            },
            currency: Currency::for_direction(direction, self.currency.amount, self.currency.kind),
            pending: self.is_pending,
            direction,
        }
    }
}

/// Cursor-paginated transaction listing of one user in one direction.
#[derive(Debug, Clone)]
pub struct TransactionFeed {
    session: Session,
    economy: String,
    user_id: i64,
    direction: Direction,
    page_limit: u32,
}

impl TransactionFeed {
    pub fn new(
        session: Session,
        endpoints: &Endpoints,
        user_id: i64,
        direction: Direction,
        page_limit: u32,
    ) -> Self {
        Self {
            session,
            economy: endpoints.economy.clone(),
            user_id,
            direction,
            page_limit,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    /// One newest-first page; `cursor` `None` is the most recent page.
    pub async fn fetch_page(&self, cursor: Option<&str>) -> Result<Page<Transaction>, Error> {
        let mut url = endpoint(&self.economy, &format!("v2/users/{}/transactions", self.user_id))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("transactionType", self.direction.as_query());
            query.append_pair("limit", &self.page_limit.to_string());
            if let Some(cursor) = cursor {
                query.append_pair("cursor", cursor);
            }
        }

        let response = self.session.execute(PreparedRequest::get(url.clone())).await?;
        response.check_status(StatusCode::OK)?;
        let wire: TransactionPageWire = response.json(url.path())?;

        let items: Vec<Transaction> = wire
            .data
            .into_iter()
            .map(|row| row.into_transaction(self.direction))
            .collect();
        watch_trace!(
            "{} page at cursor {:?}: {} items",
            self.direction.as_query(),
            cursor,
            items.len()
        );
        let next_cursor = wire.next_page_cursor.filter(|next| !next.is_empty());
        Ok(Page::new(items, next_cursor))
    }
}

#[async_trait]
impl PageSource for TransactionFeed {
    type Item = Transaction;

    async fn fetch_since(
        &self,
        mark: HighWaterMark,
        updates: &Updates<Transaction>,
    ) -> Result<HighWaterMark, Error> {
        let mut walk = SyncWalk::new(mark);
        let mut cursor: Option<String> = None;

        loop {
            if updates.is_closed() {
                return Ok(walk.start());
            }
            let page = self.fetch_page(cursor.as_deref()).await.with_context(|| {
                format!(
                    "failed to retrieve page {} of {} transactions",
                    walk.pages_seen() + 1,
                    self.direction.as_query()
                )
            })?;

            let verdict = walk.accept(&page);
            for transaction in verdict.fresh {
                if !updates.push(transaction.clone()).await {
                    watch_debug!("relay closed, dropping rest of {} cycle", self.direction.as_query());
                    return Ok(walk.start());
                }
            }

            match verdict.step {
                WalkStep::Continue { cursor: next } => cursor = Some(next),
                WalkStep::Finished { mark } => return Ok(mark),
            }
        }
    }
}
