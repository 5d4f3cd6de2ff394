//! Tradewatch engine: cookie session, anti-forgery retries and transaction polling.
mod account;
mod error;
mod markup;
mod poller;
mod session;
mod settings;
mod transactions;
mod types;
mod users;
mod verify;

pub use account::{Account, SessionKeeper, UserInfo};
pub use error::{AuthError, DecodeError, Error, PollError, ResultExt, TransportError, VerificationError};
pub use markup::{decode_body, verification_inputs};
pub use poller::{start_polling, PageSource, PollEvent, PollHandle, Updates};
pub use session::{stop_redirects, RedirectAction, RedirectAttempt, RedirectGuard, RedirectHook, Session};
pub use settings::{ClientSettings, Endpoints, PollSettings, SessionSettings, FORM_CONTENT_TYPE};
pub use transactions::TransactionFeed;
pub use types::{PreparedRequest, SessionResponse};
