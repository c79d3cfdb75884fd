use crate::models::{Record, StreakState};

pub fn render_index(today: &str, latest: Option<&Record>, streak: &StreakState) -> String {
    let (value, delta) = match latest {
        Some(record) => (record.value.to_string(), format!("{:+}", record.delta)),
        None => ("--".to_string(), "--".to_string()),
    };
    INDEX_HTML
        .replace("{{DATE}}", today)
        .replace("{{VALUE}}", &value)
        .replace("{{DELTA}}", &delta)
        .replace("{{STREAK}}", &streak.current_streak.to_string())
        .replace("{{LONGEST}}", &streak.longest_streak.to_string())
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>Coin Tracker</title>
  <link rel="manifest" href="/static/manifest.json" />
  <style>
    :root { --ink: #24303a; --accent: #d99a1e; --card: #fffdf7; }
    * { box-sizing: border-box; }
    body {
      margin: 0; min-height: 100vh; display: grid; place-items: center;
      background: linear-gradient(160deg, #fbf3dc, #f1e2b8); color: var(--ink);
      font-family: "Trebuchet MS", sans-serif; padding: 24px;
    }
    .app { width: min(760px, 100%); background: var(--card); border-radius: 24px; padding: 32px; display: grid; gap: 24px; box-shadow: 0 20px 50px rgba(36, 48, 58, 0.15); }
    h1 { margin: 0; }
    .panel { display: grid; grid-template-columns: repeat(auto-fit, minmax(140px, 1fr)); gap: 12px; }
    .stat { background: white; border-radius: 14px; padding: 14px; border: 1px solid #eee2c4; }
    .stat .label { display: block; font-size: 0.8rem; text-transform: uppercase; color: #8a8170; }
    .stat .value { font-size: 1.5rem; font-weight: 600; }
    form { display: flex; flex-wrap: wrap; gap: 10px; }
    input { padding: 10px 12px; border-radius: 10px; border: 1px solid #d8ccb0; font-size: 1rem; }
    button { padding: 10px 18px; border: none; border-radius: 999px; background: var(--accent); color: white; font-weight: 600; cursor: pointer; }
    button.secondary { background: var(--ink); }
    table { width: 100%; border-collapse: collapse; }
    td, th { text-align: left; padding: 6px 4px; border-bottom: 1px solid #f0e6cf; }
    .status { min-height: 1.2em; color: #6b645d; }
  </style>
</head>
<body>
  <main class="app">
    <header>
      <h1>Coin Tracker</h1>
      <p>Log one value per day. Today is <strong>{{DATE}}</strong>.</p>
    </header>

    <section class="panel">
      <div class="stat"><span class="label">Latest</span><span class="value" id="latest">{{VALUE}}</span></div>
      <div class="stat"><span class="label">Change</span><span class="value" id="delta">{{DELTA}}</span></div>
      <div class="stat"><span class="label">Streak</span><span class="value" id="streak">{{STREAK}}</span></div>
      <div class="stat"><span class="label">Longest</span><span class="value" id="longest">{{LONGEST}}</span></div>
    </section>

    <form id="record-form">
      <input id="value" type="number" min="0" step="1" placeholder="Coins today" required />
      <input id="note" type="text" maxlength="280" placeholder="Note (optional)" />
      <button type="submit">Save</button>
      <button type="button" class="secondary" id="sync-btn">Sync now</button>
      <a href="/api/export.csv">Export CSV</a>
    </form>

    <table>
      <thead><tr><th>Date</th><th>Value</th><th>Change</th><th>Note</th></tr></thead>
      <tbody id="records"></tbody>
    </table>

    <div class="status" id="status"></div>
  </main>

  <script>
    const statusEl = document.getElementById('status');
    const setStatus = (message) => { statusEl.textContent = message; };

    const renderRecords = (records) => {
      const body = document.getElementById('records');
      body.innerHTML = '';
      records.forEach((record) => {
        const row = document.createElement('tr');
        [record.date, record.value, record.delta, record.note].forEach((cell) => {
          const td = document.createElement('td');
          td.textContent = cell;
          row.appendChild(td);
        });
        body.appendChild(row);
      });
      if (records.length) {
        document.getElementById('latest').textContent = records[0].value;
        document.getElementById('delta').textContent = records[0].delta;
      }
    };

    const loadRecords = async () => {
      const res = await fetch('/api/records');
      if (!res.ok) throw new Error('Unable to load records');
      renderRecords(await res.json());
    };

    document.getElementById('record-form').addEventListener('submit', async (event) => {
      event.preventDefault();
      const value = Number(document.getElementById('value').value);
      const note = document.getElementById('note').value;
      const res = await fetch('/api/records', {
        method: 'POST',
        headers: { 'content-type': 'application/json' },
        body: JSON.stringify({ value, note })
      });
      if (!res.ok) { setStatus(await res.text()); return; }
      const body = await res.json();
      document.getElementById('streak').textContent = body.streak.currentStreak;
      document.getElementById('longest').textContent = body.streak.longestStreak;
      setStatus(body.pending ? `Saved (${body.pending} change(s) waiting to sync)` : 'Saved');
      loadRecords().catch((err) => setStatus(err.message));
    });

    document.getElementById('sync-btn').addEventListener('click', async () => {
      const res = await fetch('/api/sync', { method: 'POST' });
      const body = await res.json();
      setStatus(body.success ? `Sync: ${body.outcome.outcome}` : `Sync failed: ${body.message}`);
      loadRecords().catch((err) => setStatus(err.message));
    });

    window.addEventListener('online', () => fetch('/api/connectivity', {
      method: 'POST', headers: { 'content-type': 'application/json' }, body: JSON.stringify({ online: true })
    }));
    window.addEventListener('offline', () => fetch('/api/connectivity', {
      method: 'POST', headers: { 'content-type': 'application/json' }, body: JSON.stringify({ online: false })
    }));

    loadRecords().catch((err) => setStatus(err.message));
  </script>
</body>
</html>
"#;
