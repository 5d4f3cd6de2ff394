use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::settings::endpoint;
use crate::{Account, DecodeError, Error, PreparedRequest, ResultExt};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UsernamesRequest<'a> {
    usernames: [&'a str; 1],
    exclude_banned_users: bool,
}

#[derive(Debug, Deserialize)]
struct UsernamesResponse {
    #[serde(default)]
    data: Vec<UsernameMatch>,
}

#[derive(Debug, Deserialize)]
struct UsernameMatch {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    name: String,
}

impl Account {
    pub async fn id_from_username(&self, username: &str) -> Result<i64, Error> {
        let url = endpoint(&self.settings().endpoints.users, "v1/usernames/users")?;
        let body = serde_json::to_vec(&UsernamesRequest {
            usernames: [username],
            exclude_banned_users: false,
        })
        .map_err(|source| Error::Encode {
            context: "username lookup".to_string(),
            source,
        })?;

        let request = PreparedRequest::post(url.clone(), "application/json", body)?;
        let response = self
            .session()
            .execute(request)
            .await
            .context("username lookup request failed")?;
        response.check_status(StatusCode::OK)?;
        let decoded: UsernamesResponse = response.json(url.path())?;
        decoded
            .data
            .first()
            .map(|found| found.id)
            .ok_or_else(|| Error::UserNotFound {
                query: username.to_string(),
            })
    }

    pub async fn username_from_id(&self, user_id: i64) -> Result<String, Error> {
        let url = endpoint(&self.settings().endpoints.users, &format!("v1/users/{user_id}"))?;
        let response = self
            .session()
            .execute(PreparedRequest::get(url.clone()))
            .await
            .context("user lookup request failed")?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::UserNotFound {
                query: user_id.to_string(),
            });
        }
        response.check_status(StatusCode::OK)?;
        let decoded: UserResponse = response.json(url.path())?;
        Ok(decoded.name)
    }

    pub async fn has_asset(&self, user_id: i64, asset_id: i64) -> Result<bool, Error> {
        let mut url = endpoint(&self.settings().endpoints.api, "ownership/hasasset")?;
        url.query_pairs_mut()
            .append_pair("userId", &user_id.to_string())
            .append_pair("assetId", &asset_id.to_string());

        let response = self
            .session()
            .execute(PreparedRequest::get(url.clone()))
            .await
            .context("ownership request failed")?;
        response.check_status(StatusCode::OK)?;
        let text = response.text()?;
        text.trim().parse::<bool>().map_err(|err| {
            DecodeError::Field {
                context: url.path().to_string(),
                field: "body".to_string(),
                message: err.to_string(),
            }
            .into()
        })
    }
}
