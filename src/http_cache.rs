use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

const CACHE_VERSION: u32 = 1;
const CACHE_DIR: &str = "fpl_forecast";
const INDEX_FILE: &str = "http_cache.json";
const BODY_DIR: &str = "http_bodies";

static INDEX: Mutex<Option<HttpCacheIndex>> = Mutex::new(None);

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct HttpCacheIndex {
    version: u32,
    entries: HashMap<String, CacheEntry>,
}

// Bodies are whole-season CSVs, so they live in their own files next to the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    body_file: String,
    etag: Option<String>,
    last_modified: Option<String>,
    fetched_at: u64,
}

/// GET `url` as text, revalidating a cached copy with ETag / Last-Modified.
pub fn fetch_text_cached(client: &Client, url: &str) -> Result<String> {
    let cached = {
        let mut guard = INDEX.lock().unwrap_or_else(|e| e.into_inner());
        let index = guard.get_or_insert_with(load_index);
        index.entries.get(url).cloned()
    };
    let cached_body = cached.as_ref().and_then(read_body);

    let mut req = client.get(url);
    if let (Some(entry), Some(_)) = (cached.as_ref(), cached_body.as_ref()) {
        if let Some(etag) = entry.etag.as_ref() {
            req = req.header(IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = entry.last_modified.as_ref() {
            req = req.header(IF_MODIFIED_SINCE, last_modified);
        }
    }

    let resp = req.send().context("request failed")?;
    let status = resp.status();
    let headers = resp.headers().clone();
    if status == StatusCode::NOT_MODIFIED {
        if let (Some(entry), Some(body)) = (cached, cached_body) {
            debug!(url, "http cache revalidated");
            store_entry(url, entry, None);
            return Ok(body);
        }
        return Err(anyhow!("received 304 without cache body"));
    }

    let body = resp.text().context("failed reading body")?;
    if !status.is_success() {
        return Err(anyhow!("http {status}"));
    }

    let entry = CacheEntry {
        body_file: body_file_name(url),
        etag: header_string(&headers, ETAG),
        last_modified: header_string(&headers, LAST_MODIFIED),
        fetched_at: system_time_to_secs(SystemTime::now()).unwrap_or_default(),
    };
    store_entry(url, entry, Some(&body));
    Ok(body)
}

/// Per-user cache directory: `$XDG_CACHE_HOME/fpl_forecast` or `~/.cache/fpl_forecast`.
pub fn app_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(CACHE_DIR));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}

fn header_string(
    headers: &reqwest::header::HeaderMap,
    name: reqwest::header::HeaderName,
) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

fn store_entry(url: &str, entry: CacheEntry, body: Option<&str>) {
    if let Some(body) = body
        && let Err(err) = write_body(&entry.body_file, body)
    {
        debug!(url, "skipping http cache write: {err:#}");
        return;
    }
    let mut guard = INDEX.lock().unwrap_or_else(|e| e.into_inner());
    let index = guard.get_or_insert_with(load_index);
    index.version = CACHE_VERSION;
    index.entries.insert(url.to_string(), entry);
    let _ = save_index(index);
}

fn read_body(entry: &CacheEntry) -> Option<String> {
    let path = app_cache_dir()?.join(BODY_DIR).join(&entry.body_file);
    fs::read_to_string(path).ok()
}

fn write_body(file: &str, body: &str) -> Result<()> {
    let Some(dir) = app_cache_dir().map(|d| d.join(BODY_DIR)) else {
        return Ok(());
    };
    fs::create_dir_all(&dir).context("create http body dir")?;
    let path = dir.join(file);
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, body).context("write http body")?;
    fs::rename(&tmp, &path).context("swap http body")?;
    Ok(())
}

fn load_index() -> HttpCacheIndex {
    let Some(path) = app_cache_dir().map(|d| d.join(INDEX_FILE)) else {
        return HttpCacheIndex::default();
    };
    let Ok(raw) = fs::read_to_string(path) else {
        return HttpCacheIndex::default();
    };
    let index = serde_json::from_str::<HttpCacheIndex>(&raw).unwrap_or_default();
    if index.version != CACHE_VERSION {
        return HttpCacheIndex::default();
    }
    index
}

fn save_index(index: &HttpCacheIndex) -> Result<()> {
    let Some(dir) = app_cache_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&dir).ok();
    let path = dir.join(INDEX_FILE);
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(index).context("serialize http cache")?;
    fs::write(&tmp, json).context("write http cache")?;
    fs::rename(&tmp, &path).context("swap http cache")?;
    Ok(())
}

// SHA-256 of the URL, stable across runs so cached bodies survive restarts.
fn body_file_name(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    format!("{digest:x}.body")
}

fn system_time_to_secs(time: SystemTime) -> Option<u64> {
    time.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
}
