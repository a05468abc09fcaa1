use crate::{
    batch::Batch,
    error::{DrawError, DrawResult},
    settings::Settings,
};
use reqwest::{
    blocking::Client,
    header::{ACCEPT, COOKIE, HeaderMap, HeaderValue, ORIGIN, REFERER, USER_AGENT},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use wplacer_common::ChunkAddr;

const BROWSER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64)";
const SITE: &str = "https://wplace.live";

/// Charge state as reported in a pixel response.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
pub struct ChargeSnapshot {
    pub count: f64,
    pub max: f64,
}

/// Full charge state from the account endpoint.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChargeStatus {
    pub count: f64,
    pub max: f64,
    /// time to regenerate one charge
    pub cooldown: Duration,
}

#[derive(Clone, Debug)]
pub struct SubmitResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Deserialize)]
struct PixelResponseBody {
    #[serde(default)]
    charges: Option<ChargeSnapshot>,
}

impl SubmitResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Charge state carried by the body, if it is there and sane.
    pub fn charges(&self) -> Option<ChargeSnapshot> {
        let body = match serde_json::from_str::<PixelResponseBody>(&self.body) {
            Ok(body) => body,
            Err(error) => {
                debug!(?error, status = self.status, "unparseable pixel response body");
                return None;
            }
        };

        body.charges.filter(|charges| {
            charges.count.is_finite() && charges.max.is_finite() && charges.max >= 0.0
        })
    }
}

/// Sends one batch, exactly one delivery attempt per call.
pub trait SubmissionClient {
    fn submit(&mut self, batch: &Batch) -> DrawResult<SubmitResponse>;
}

pub trait ChargeSource {
    fn fetch_charges(&self) -> DrawResult<ChargeStatus>;
}

#[derive(Serialize)]
struct PixelPayload<'a> {
    coords: &'a [u32],
    colors: &'a [u8],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MeCharges {
    count: f64,
    max: f64,
    cooldown_ms: f64,
}

#[derive(Deserialize)]
struct MeResponse {
    charges: MeCharges,
}

fn charge_status(me: MeResponse) -> DrawResult<ChargeStatus> {
    let MeCharges {
        count,
        max,
        cooldown_ms,
    } = me.charges;

    if !count.is_finite() || !max.is_finite() || !cooldown_ms.is_finite() || cooldown_ms < 0.0 {
        return Err(DrawError::MalformedCharges(format!(
            "count={count} max={max} cooldownMs={cooldown_ms}"
        )));
    }

    let cooldown = Duration::try_from_secs_f64(cooldown_ms / 1000.0).map_err(|error| {
        DrawError::MalformedCharges(format!("cooldownMs={cooldown_ms}: {error}"))
    })?;

    Ok(ChargeStatus {
        count,
        max,
        cooldown,
    })
}

/// Blocking client for one chunk of the canvas.
pub struct HttpClient {
    client: Client,
    base_url: String,
    chunk: ChunkAddr,
}

impl HttpClient {
    pub fn new(settings: &Settings, chunk: ChunkAddr) -> DrawResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(REFERER, HeaderValue::from_static("https://wplace.live/"));
        headers.insert(ORIGIN, HeaderValue::from_static(SITE));

        let mut cookie = HeaderValue::from_str(&settings.cookie_header())
            .map_err(|error| DrawError::Settings(format!("invalid cookie value: {error}")))?;
        cookie.set_sensitive(true);
        headers.insert(COOKIE, cookie);

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url().to_string(),
            chunk,
        })
    }

    fn pixel_url(&self) -> String {
        format!(
            "{}/s0/pixel/{}/{}",
            self.base_url, self.chunk.x, self.chunk.y
        )
    }
}

impl SubmissionClient for HttpClient {
    fn submit(&mut self, batch: &Batch) -> DrawResult<SubmitResponse> {
        let payload = PixelPayload {
            coords: &batch.coords,
            colors: &batch.colors,
        };

        // no status at all, the retry policy decides what happens next
        let response = self
            .client
            .post(self.pixel_url())
            .json(&payload)
            .send()
            .map_err(|error| DrawError::Transport(error.to_string()))?;
        let status = response.status().as_u16();
        // a body we cannot read is the same as one without charges
        let body = response.text().unwrap_or_default();

        Ok(SubmitResponse { status, body })
    }
}

impl ChargeSource for HttpClient {
    fn fetch_charges(&self) -> DrawResult<ChargeStatus> {
        let me: MeResponse = self
            .client
            .get(format!("{}/me", self.base_url))
            .send()?
            .error_for_status()?
            .json()?;

        charge_status(me)
    }
}
