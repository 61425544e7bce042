use std::fmt;
use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveDateTime, Timelike};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};
use ureq::http::{Response, StatusCode};
use ureq::{Agent, Body};

use crate::core::client::{ClientError, Connector, UsageClient};
use crate::core::config::ConfigEntry;
use crate::core::models::usage::UsageReading;

const BASE_URL: &str = "https://myaccount.srpnet.com/myaccountapi/api/";
const LOGIN_ENDPOINT: &str = "login/authorize";
const TOKEN_ENDPOINT: &str = "login/antiforgerytoken";
const USAGE_ENDPOINT: &str = "usage/hourlydetail";
const LOGIN_SUCCESS_MESSAGE: &str = "Log in successful.";
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const QUERY_DATE_FORMAT: &str = "%m-%d-%Y";

#[derive(Deserialize)]
struct LoginResponse {
    message: Option<String>,
}

#[derive(Deserialize)]
struct AntiForgeryResponse {
    #[serde(rename = "xsrfToken")]
    xsrf_token: Option<String>,
}

#[derive(Deserialize)]
struct HourlyDetailResponse {
    #[serde(rename = "hourlyUsageList")]
    hourly_usage_list: Option<Vec<HourlyUsage>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HourlyUsage {
    date: Option<String>,
    hour: Option<String>,
    total_kwh: Option<Value>,
    on_peak_kwh: Option<Value>,
    off_peak_kwh: Option<Value>,
    shoulder_kwh: Option<Value>,
    super_off_peak_kwh: Option<Value>,
    total_cost: Option<Value>,
}

/// Client for the SRP "My Account" usage API.
pub struct SrpClient {
    base_url: String,
    account_id: String,
    username: String,
    password: String,
    is_tou: bool,
}

impl fmt::Debug for SrpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SrpClient")
            .field("base_url", &self.base_url)
            .field("account_id", &self.account_id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("is_tou", &self.is_tou)
            .finish()
    }
}

impl SrpClient {
    pub fn new(
        account_id: &str,
        username: &str,
        password: &str,
        is_tou: bool,
    ) -> Result<Self, ClientError> {
        if account_id.is_empty() || !account_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(ClientError::InvalidAccount(account_id.to_string()));
        }
        Ok(Self {
            base_url: BASE_URL.to_string(),
            account_id: account_id.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            is_tou,
        })
    }

    fn agent() -> Agent {
        Agent::config_builder()
            .timeout_global(Some(HTTP_TIMEOUT))
            .http_status_as_error(false)
            .build()
            .into()
    }

    /// Point the client at another API root. `base_url` must end with `/`.
    pub(crate) fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Log the agent's session in. Returns `false` if the credentials were rejected.
    fn login(&self, agent: &Agent) -> Result<bool, ClientError> {
        let response = agent
            .post(self.url(LOGIN_ENDPOINT))
            .send_form([
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
            ])
            .map_err(|source| ClientError::Connection {
                endpoint: LOGIN_ENDPOINT,
                source,
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Ok(false);
        }
        let login: LoginResponse = read_json(response, LOGIN_ENDPOINT)?;
        Ok(login.message.as_deref() == Some(LOGIN_SUCCESS_MESSAGE))
    }

    fn xsrf_token(&self, agent: &Agent) -> Result<String, ClientError> {
        let response = agent
            .get(self.url(TOKEN_ENDPOINT))
            .call()
            .map_err(|source| ClientError::Connection {
                endpoint: TOKEN_ENDPOINT,
                source,
            })?;
        let data: AntiForgeryResponse = read_json(response, TOKEN_ENDPOINT)?;
        data.xsrf_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ClientError::Malformed {
                endpoint: TOKEN_ENDPOINT,
                reason: "missing xsrfToken".to_string(),
            })
    }
}

impl UsageClient for SrpClient {
    #[instrument(skip(self), fields(account = %self.account_id))]
    fn validate(&self) -> Result<bool, ClientError> {
        let valid = self.login(&Self::agent())?;
        debug!(valid, "Validated credentials");
        Ok(valid)
    }

    #[instrument(skip(self), fields(account = %self.account_id, tou = self.is_tou))]
    fn usage(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<UsageReading>, ClientError> {
        check_window(start, end, Local::now().naive_local())?;

        let agent = Self::agent();
        if !self.login(&agent)? {
            return Err(ClientError::Http {
                status: StatusCode::UNAUTHORIZED.as_u16(),
                endpoint: LOGIN_ENDPOINT,
            });
        }
        let token = self.xsrf_token(&agent)?;

        let response = agent
            .get(self.url(USAGE_ENDPOINT))
            .query("billaccount", &self.account_id)
            .query("beginDate", start.format(QUERY_DATE_FORMAT).to_string())
            .query("endDate", end.format(QUERY_DATE_FORMAT).to_string())
            .header("x-xsrf-token", token.as_str())
            .call()
            .map_err(|source| ClientError::Connection {
                endpoint: USAGE_ENDPOINT,
                source,
            })?;
        let detail: HourlyDetailResponse = read_json(response, USAGE_ENDPOINT)?;
        let readings = parse_hourly_usage(detail, self.is_tou)?;
        debug!(count = readings.len(), "Fetched hourly usage");
        Ok(readings)
    }
}

/// Connects to SRP with the credentials of a config entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct SrpConnector;

impl Connector for SrpConnector {
    fn connect(&self, entry: &ConfigEntry) -> Result<Box<dyn UsageClient>, ClientError> {
        let client = SrpClient::new(
            &entry.account_id,
            &entry.username,
            &entry.password,
            entry.is_tou,
        )?;
        Ok(Box::new(client))
    }
}

fn read_json<T: DeserializeOwned>(
    mut response: Response<Body>,
    endpoint: &'static str,
) -> Result<T, ClientError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ClientError::Http {
            status: status.as_u16(),
            endpoint,
        });
    }
    response
        .body_mut()
        .read_json::<T>()
        .map_err(|e| ClientError::Malformed {
            endpoint,
            reason: e.to_string(),
        })
}

fn check_window(
    start: NaiveDateTime,
    end: NaiveDateTime,
    now: NaiveDateTime,
) -> Result<(), ClientError> {
    if start > end {
        return Err(ClientError::InvalidWindow(format!(
            "start {} is after end {}",
            start, end
        )));
    }
    if start > now {
        return Err(ClientError::InvalidWindow(format!(
            "start {} is in the future",
            start
        )));
    }
    Ok(())
}

fn parse_hourly_usage(
    detail: HourlyDetailResponse,
    is_tou: bool,
) -> Result<Vec<UsageReading>, ClientError> {
    let list = detail
        .hourly_usage_list
        .ok_or_else(|| ClientError::Malformed {
            endpoint: USAGE_ENDPOINT,
            reason: "missing hourlyUsageList".to_string(),
        })?;

    list.into_iter()
        .map(|entry| {
            let timestamp = parse_timestamp(&entry)?;
            let kwh = if is_tou {
                sum_present(&[
                    &entry.on_peak_kwh,
                    &entry.off_peak_kwh,
                    &entry.shoulder_kwh,
                    &entry.super_off_peak_kwh,
                ])
            } else {
                numeric(entry.total_kwh.as_ref())
            };
            Ok(UsageReading {
                date: timestamp.date(),
                hour: timestamp.hour(),
                minute: timestamp.minute(),
                kwh,
                cost: numeric(entry.total_cost.as_ref()),
            })
        })
        .collect()
}

fn parse_timestamp(entry: &HourlyUsage) -> Result<NaiveDateTime, ClientError> {
    let raw = entry
        .hour
        .as_deref()
        .or(entry.date.as_deref())
        .ok_or_else(|| ClientError::Malformed {
            endpoint: USAGE_ENDPOINT,
            reason: "usage entry without date or hour".to_string(),
        })?;

    raw.parse::<NaiveDateTime>()
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| ClientError::Malformed {
            endpoint: USAGE_ENDPOINT,
            reason: format!("unparseable timestamp '{}'", raw),
        })
}

/// Numbers pass through, numeric strings are parsed, anything else is `None`.
fn numeric(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Sum of the present values. `None` if nothing is present or a present value
/// is not numeric.
fn sum_present(values: &[&Option<Value>]) -> Option<f64> {
    let mut total = None;
    for value in values.iter().copied().flatten() {
        if value.is_null() {
            continue;
        }
        total = Some(total.unwrap_or(0.0) + numeric(Some(value))?);
    }
    total
}
