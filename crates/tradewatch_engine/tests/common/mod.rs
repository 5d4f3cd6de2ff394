#![allow(dead_code)]

use std::time::Duration;

use serde_json::{json, Value};
use tradewatch_engine::{ClientSettings, Endpoints, PollSettings, Session, SessionSettings};
use wiremock::MockServer;

pub const COOKIE: &str = "_|WARNING:-DO-NOT-SHARE-THIS.|_secret";

pub fn session_settings() -> SessionSettings {
    tradewatch_logging::initialize_for_tests();
    SessionSettings {
        cookie_domain: None,
        ..SessionSettings::default()
    }
}

pub fn client_settings(server: &MockServer) -> ClientSettings {
    ClientSettings {
        session: session_settings(),
        endpoints: Endpoints::all_at(server.uri()),
        poll: PollSettings {
            interval: Duration::from_millis(20),
            channel_capacity: 1,
        },
        ..ClientSettings::default()
    }
}

pub fn session_for(server: &MockServer) -> Session {
    Session::from_session_cookie(COOKIE, &server.uri(), session_settings()).unwrap()
}

pub fn transaction_row(id: i64, amount: i64) -> Value {
    json!({
        "id": id,
        "transactionType": "Sale",
        "created": "2024-03-09T12:30:00.000Z",
        "isPending": false,
        "agent": { "id": 77, "type": "User", "name": "builderman" },
        "details": { "id": 4242, "name": "Sword", "type": "Asset" },
        "currency": { "amount": amount, "type": "Robux" }
    })
}

pub fn transaction_page(ids: &[i64], next: Option<&str>) -> Value {
    json!({
        "previousPageCursor": null,
        "nextPageCursor": next,
        "data": ids.iter().map(|id| transaction_row(*id, 10)).collect::<Vec<_>>()
    })
}
