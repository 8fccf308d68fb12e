//! Mailbox JSON APIs and the HTML message view.

use crate::{app::AppState, models::email::new_email::EmailPatch, util::html_escape};
use axum::{
  Json,
  extract::{Path as AxumPath, State},
  http::StatusCode,
  response::{Html, IntoResponse, Response},
};
use chrono::Utc;
use serde_json::json;
use tracing::error;
use uuid::Uuid;

fn db_error(context: &str, e: crate::error::Error) -> Response {
  error!("{context} error: {e}");
  (
    StatusCode::INTERNAL_SERVER_ERROR,
    Json(json!({ "error": "storage error" })),
  )
    .into_response()
}

fn not_found() -> Response {
  (
    StatusCode::NOT_FOUND,
    Json(json!({ "error": "email not found" })),
  )
    .into_response()
}

pub async fn list_emails(
  State(state): State<AppState>,
  AxumPath(address): AxumPath<String>,
) -> Response {
  match state
    .store
    .list_by_recipient(&address, state.config.list_limit)
    .await
  {
    Ok(rows) => Json(rows).into_response(),
    Err(e) => db_error("list_emails", e),
  }
}

pub async fn get_email(State(state): State<AppState>, AxumPath(id): AxumPath<Uuid>) -> Response {
  match state.store.get_by_id(id).await {
    Ok(Some(email)) => Json(email).into_response(),
    Ok(None) => not_found(),
    Err(e) => db_error("get_email", e),
  }
}

pub async fn update_email(
  State(state): State<AppState>,
  AxumPath(id): AxumPath<Uuid>,
  Json(patch): Json<EmailPatch>,
) -> Response {
  if patch.is_empty() {
    return (
      StatusCode::BAD_REQUEST,
      Json(json!({ "error": "no fields to update" })),
    )
      .into_response();
  }
  match state.store.update(id, &patch).await {
    Ok(true) => Json(json!({ "message": "email updated" })).into_response(),
    Ok(false) => not_found(),
    Err(e) => db_error("update_email", e),
  }
}

pub async fn delete_email(State(state): State<AppState>, AxumPath(id): AxumPath<Uuid>) -> Response {
  match state.store.delete_by_id(id).await {
    Ok(_) => Json(json!({ "success": true })).into_response(),
    Err(e) => db_error("delete_email", e),
  }
}

pub async fn stats(State(state): State<AppState>) -> Response {
  match state.store.stats().await {
    Ok(s) => Json(json!({
      "total_emails": s.total_emails,
      "unique_addresses": s.unique_addresses,
      "unique_senders": s.unique_senders,
      "retention_days": state.config.retention_days,
    }))
    .into_response(),
    Err(e) => db_error("stats", e),
  }
}

pub async fn health() -> impl IntoResponse {
  Json(json!({ "status": "ok", "timestamp": Utc::now() }))
}

/// Standalone page for one message. Like the JSON detail, it marks the message read.
pub async fn get_email_html(
  State(state): State<AppState>,
  AxumPath(id): AxumPath<Uuid>,
) -> Response {
  let m = match state.store.get_by_id(id).await {
    Ok(Some(m)) => m,
    Ok(None) => return (StatusCode::NOT_FOUND, "email not found").into_response(),
    Err(e) => return db_error("get_email_html", e),
  };
  let body = if m.body_html.is_empty() {
    format!("<pre>{}</pre>", html_escape(&m.body_text))
  } else {
    m.body_html.clone()
  };
  let attachments = if m.attachments.is_empty() {
    "None".to_string()
  } else {
    m.attachments
      .iter()
      .map(|a| {
        format!(
          "<li>{} ({} bytes, {})</li>",
          html_escape(a.filename.as_deref().unwrap_or("(attachment)")),
          a.size,
          html_escape(&a.content_type)
        )
      })
      .collect::<Vec<_>>()
      .join("")
  };
  let from = if m.from_name.is_empty() {
    m.from_email.clone()
  } else {
    format!("{} <{}>", m.from_name, m.from_email)
  };
  let tmpl = r#"<!doctype html>
<html lang="en"><head><meta charset="utf-8" />
<meta name="viewport" content="width=device-width, initial-scale=1" />
<title>{SUBJECT}</title>
<style>body { font-family: system-ui, sans-serif; margin: 1.5rem; }</style>
</head>
<body>
  <p><a href="/?address={TO}">← back</a></p>
  <h2>{SUBJECT}</h2>
  <p><strong>From:</strong> {FROM} &nbsp; <strong>To:</strong> {TO} &nbsp; <strong>Received:</strong> {WHEN}</p>
  <hr/>
  <iframe sandbox srcdoc="{HTML}" style="width:100%;min-height:60vh;border:0"></iframe>
  <h3>Attachments</h3>
  <ul>{ATTACHMENTS}</ul>
</body></html>"#;
  let page = fill_template(
    tmpl,
    &[
      ("SUBJECT", html_escape(&m.subject)),
      ("FROM", html_escape(&from)),
      ("TO", html_escape(&m.to_email)),
      ("WHEN", m.received_at.to_rfc3339()),
      ("ATTACHMENTS", attachments),
      ("HTML", html_escape(&body)),
    ],
  );
  Html(page).into_response()
}

/// Substitute `{KEY}` placeholders in a single pass over `tmpl`.
///
/// Inserted values are never scanned again, so placeholder text inside a
/// value stays literal. Unknown placeholders are left as they are.
fn fill_template(tmpl: &str, values: &[(&str, String)]) -> String {
  let mut out = String::with_capacity(tmpl.len());
  let mut rest = tmpl;
  while let Some(open) = rest.find('{') {
    out.push_str(&rest[..open]);
    let after = &rest[open + 1..];
    let value = after.find('}').and_then(|close| {
      let key = &after[..close];
      values
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| (v, close))
    });
    match value {
      Some((v, close)) => {
        out.push_str(v);
        rest = &after[close + 1..];
      }
      None => {
        out.push('{');
        rest = after;
      }
    }
  }
  out.push_str(rest);
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn placeholders_inside_values_stay_literal() {
    let page = fill_template(
      "<h2>{SUBJECT}</h2><ul>{ATTACHMENTS}</ul>{HTML}",
      &[
        ("SUBJECT", "{HTML} and {ATTACHMENTS}".to_string()),
        ("ATTACHMENTS", "<li>a.txt</li>".to_string()),
        ("HTML", "body".to_string()),
      ],
    );
    assert_eq!(
      page,
      "<h2>{HTML} and {ATTACHMENTS}</h2><ul><li>a.txt</li></ul>body"
    );
  }

  #[test]
  fn unknown_and_unclosed_braces_are_kept() {
    let page = fill_template(
      "a { b } {X} {NOPE} {",
      &[("X", "x".to_string())],
    );
    assert_eq!(page, "a { b } x {NOPE} {");
  }
}
