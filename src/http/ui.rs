//! Mailbox page.

use axum::response::Html;

pub async fn ui_index() -> Html<&'static str> {
  Html(TEMPLATE)
}

const TEMPLATE: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>tempinbox</title>
  <style>
    body { font-family: system-ui, sans-serif; margin: 2rem; }
    h1 { margin: 0 0 1rem 0; }
    table { width: 100%; border-collapse: collapse; }
    th, td { border-bottom: 1px solid #ddd; text-align: left; padding: .5rem; }
    tr.unread td { font-weight: 600; }
    .actions { margin: 1rem 0; }
    .muted { color: #666; font-size: 12px; }
  </style>
  <script>
    const esc = (s) => String(s ?? '').replace(/[&<>"]/g, c => ({'&':'&amp;','<':'&lt;','>':'&gt;','"':'&quot;'}[c]));
    async function loadInbox() {
      const address = document.getElementById('address').value.trim().toLowerCase();
      if (!address) return;
      history.replaceState(null, '', '?address=' + encodeURIComponent(address));
      const res = await fetch('/api/emails/' + encodeURIComponent(address));
      const rows = await res.json();
      const tbody = document.getElementById('rows');
      if (!rows.length) { tbody.innerHTML = '<tr><td colspan="4">No mail yet</td></tr>'; return; }
      tbody.innerHTML = rows.map(m => `<tr class="${m.is_read ? '' : 'unread'}">
        <td>${esc(m.from_name || m.from_email)}</td>
        <td><a href="/email/${m.id}/html">${esc(m.subject)}</a><div class="muted">${esc(m.preview)}</div></td>
        <td>${esc(m.received_at)}</td>
        <td><button onclick="removeEmail('${m.id}')">Delete</button></td></tr>`).join('');
    }
    async function removeEmail(id) {
      await fetch('/api/email/' + id, { method: 'DELETE' });
      loadInbox();
    }
    async function loadStats() {
      const s = await (await fetch('/api/stats')).json();
      document.getElementById('stats').textContent =
        `${s.total_emails} emails for ${s.unique_addresses} addresses, kept ${s.retention_days} days`;
    }
    window.addEventListener('load', () => {
      const q = new URLSearchParams(location.search).get('address');
      if (q) { document.getElementById('address').value = q; loadInbox(); }
      loadStats();
      setInterval(loadInbox, 5000);
    });
  </script>
</head>
<body>
  <h1>tempinbox</h1>
  <div class="actions">
    <input id="address" placeholder="anything@your-domain" size="40" onkeydown="if(event.key==='Enter')loadInbox()" />
    <button onclick="loadInbox()">Open inbox</button>
  </div>
  <p class="muted" id="stats"></p>
  <table>
    <thead><tr><th>From</th><th>Subject</th><th>Received</th><th></th></tr></thead>
    <tbody id="rows"></tbody>
  </table>
</body>
</html>
"#;
