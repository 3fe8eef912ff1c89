//! HTTP routes of the built-in web UI
//!
//! The firmware's TCP loop parses the request line with [`Route::parse`],
//! lets [`WebContext::handle`] perform the side effects and then writes the
//! head from [`Reply::head`] followed by the body.
//!
//! | Path                     | Reply                                   |
//! |--------------------------|-----------------------------------------|
//! | `/`, `/index.html`       | index page, purple pulse                |
//! | `/data.json`             | time-series snapshot                    |
//! | `/Air_Quality_Data.csv`  | CSV log as an attachment                |
//! | `/clear`                 | reset store and CSV, redirect to `/`    |
//! | `/lightoff`              | switch the bar off, redirect to `/`     |
//! | `/selftest`              | LED self-test, redirect to `/`          |
//! | `/settime?epoch=<secs>`  | offer a network time, redirect to `/`   |
//! | anything else            | redirect to `/index.html`               |

use alloc::vec::Vec;
use core::fmt::{self, Write};

use log::{debug, warn};

use crate::config::CSV_FILE_NAME;
use crate::latest::LatestValue;
use crate::light_bar::{ModeRequest, ModeRequests, PulseKind};
use crate::pipeline::{self, TimeSeries};

pub type HeadBuf = heapless::String<256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Index,
    DataJson,
    CsvDownload,
    ClearData,
    LightOff,
    SelfTest,
    SetTime(u64),
    Redirect,
}

impl Route {
    /// Route a raw request. Only the request line is looked at.
    pub fn parse(request: &[u8]) -> Self {
        let line_end = request
            .iter()
            .position(|&b| b == b'\r' || b == b'\n')
            .unwrap_or(request.len());
        match core::str::from_utf8(&request[..line_end]) {
            Ok(line) => Self::from_request_line(line),
            Err(_) => Self::Redirect,
        }
    }

    /// Route a request line such as `GET /data.json HTTP/1.1`.
    pub fn from_request_line(line: &str) -> Self {
        let mut parts = line.split_ascii_whitespace();
        let (Some("GET"), Some(target)) = (parts.next(), parts.next()) else {
            return Self::Redirect;
        };

        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        match path {
            "/" | "/index.html" => Self::Index,
            "/data.json" => Self::DataJson,
            "/clear" => Self::ClearData,
            "/lightoff" => Self::LightOff,
            "/selftest" => Self::SelfTest,
            "/settime" => match query_param(query, "epoch").and_then(|v| v.parse().ok()) {
                Some(epoch) => Self::SetTime(epoch),
                None => Self::Redirect,
            },
            _ if path.strip_prefix('/') == Some(CSV_FILE_NAME) => Self::CsvDownload,
            _ => Self::Redirect,
        }
    }
}

fn query_param<'q>(query: &'q str, key: &str) -> Option<&'q str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find_map(|(k, v)| (k == key).then_some(v))
}

/// What the handler decided to send back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Page,
    Json(Vec<u8>),
    /// Stream the CSV log; the server looks up its size
    Csv,
    Redirect(&'static str),
    /// A shared resource stayed locked; the client should retry
    Unavailable,
}

impl Reply {
    /// Response head for a body of `content_length` bytes.
    pub fn head(&self, content_length: usize) -> Result<HeadBuf, fmt::Error> {
        let mut head = HeadBuf::new();
        match self {
            Self::Page => {
                head.write_str("HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\n")?;
            }
            Self::Json(_) => {
                head.write_str(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nCache-Control: max-age=5\r\n",
                )?;
            }
            Self::Csv => {
                write!(
                    head,
                    "HTTP/1.1 200 OK\r\nContent-Type: text/csv\r\n\
                     Content-Disposition: attachment; filename=\"{}\"\r\n\
                     Cache-Control: no-store\r\n",
                    CSV_FILE_NAME
                )?;
            }
            Self::Redirect(location) => {
                write!(head, "HTTP/1.1 302 Found\r\nLocation: {}\r\n", location)?;
            }
            Self::Unavailable => {
                head.write_str("HTTP/1.1 503 Service Unavailable\r\nRetry-After: 1\r\n")?;
            }
        }
        write!(
            head,
            "Content-Length: {}\r\nConnection: close\r\n\r\n",
            content_length
        )?;
        Ok(head)
    }
}

/// Shared state the routes act on
#[derive(Clone, Copy)]
pub struct WebContext<'a> {
    pub store: &'a TimeSeries,
    pub csv_clear: &'a LatestValue<()>,
    pub light_mode: &'a ModeRequests,
    pub network_time: &'a LatestValue<u64>,
}

impl WebContext<'static> {
    pub fn global() -> Self {
        Self {
            store: &pipeline::TIME_SERIES,
            csv_clear: &pipeline::CSV_CLEAR,
            light_mode: &pipeline::LIGHT_MODE,
            network_time: &pipeline::NETWORK_TIME,
        }
    }
}

impl WebContext<'_> {
    pub async fn handle(&self, route: Route) -> Reply {
        debug!("HTTP {:?}", route);
        match route {
            Route::Index => {
                self.light_mode
                    .publish(ModeRequest::Pulse(PulseKind::ClientConnected));
                Reply::Page
            }
            Route::DataJson => match self.store.snapshot().await {
                Ok(json) => Reply::Json(json),
                Err(e) => {
                    warn!("No snapshot for /data.json: {}", e);
                    Reply::Unavailable
                }
            },
            Route::CsvDownload => Reply::Csv,
            Route::ClearData => {
                if let Err(e) = self.store.reset().await {
                    warn!("Time series reset skipped: {}", e);
                }
                self.csv_clear.publish(());
                Reply::Redirect("/")
            }
            Route::LightOff => {
                self.light_mode.publish(ModeRequest::Off);
                Reply::Redirect("/")
            }
            Route::SelfTest => {
                self.light_mode.publish(ModeRequest::SelfTest);
                Reply::Redirect("/")
            }
            Route::SetTime(epoch) => {
                self.network_time.publish(epoch);
                Reply::Redirect("/")
            }
            Route::Redirect => Reply::Redirect("/index.html"),
        }
    }
}

/// Index page: live chart drawn from `/data.json` plus the control links.
///
/// The device runs as an access point without internet, so the chart is drawn
/// on a plain canvas instead of pulling in a charting library.
pub const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html><head><meta charset="utf-8"><meta name="viewport" content="width=device-width,initial-scale=1">
<title>CO2 Bar</title>
<style>body{font-family:sans-serif;margin:1em;background:#111;color:#eee}canvas{width:100%;height:220px;background:#1b1b1b;margin-bottom:.5em}a{color:#8cf;margin-right:1em}</style>
</head><body>
<h2>CO2 Bar</h2>
<div id="charts"></div>
<p><a href="/Air_Quality_Data.csv">Download CSV</a><a href="/clear" onclick="return confirm('Clear all data?')">Clear data</a><a href="/lightoff">Light off</a><a href="/selftest">Self test</a></p>
<script>
fetch('/settime?epoch='+Math.floor(Date.now()/1000),{redirect:'manual'}).catch(()=>{});
function draw(c,s){const x=c.getContext('2d'),w=c.width=c.clientWidth,h=c.height=c.clientHeight;x.clearRect(0,0,w,h);
const p=s.data.filter(d=>d[1]!==null);x.fillStyle='#eee';x.fillText(s.name+' ('+s.y_title+')'+(p.length?': '+p[p.length-1][1]:''),8,14);if(p.length<2)return;
const t0=p[0][0],t1=p[p.length-1][0],v=p.map(d=>d[1]),lo=Math.min(...v),hi=Math.max(...v),r=(hi-lo)||1;
x.strokeStyle=s.color;x.lineWidth=2;x.beginPath();p.forEach((d,i)=>{const px=(d[0]-t0)/((t1-t0)||1)*(w-16)+8,py=h-8-(d[1]-lo)/r*(h-32);i?x.lineTo(px,py):x.moveTo(px,py)});x.stroke();
x.fillText(hi.toFixed(1),w-48,28);x.fillText(lo.toFixed(1),w-48,h-10);}
function refresh(){fetch('/data.json').then(r=>r.json()).then(all=>{const root=document.getElementById('charts');
all.forEach((s,i)=>{let c=root.children[i];if(!c){c=document.createElement('canvas');root.appendChild(c)}draw(c,s)})}).catch(()=>{})}
refresh();setInterval(refresh,5000);
</script></body></html>
"#;
