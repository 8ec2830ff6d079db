use axum::{extract::State, response::Html, routing::get, Router};

use crate::models::AppState;

pub fn router(state: AppState) -> Router {
    Router::new().route("/", get(index)).with_state(state)
}

async fn index(State(state): State<AppState>) -> Html<String> {
    let accept = state
        .config
        .staging
        .allowed_extensions
        .iter()
        .map(|e| format!(".{}", e))
        .collect::<Vec<_>>()
        .join(",");

    Html(INDEX_HTML.replace("{{ACCEPT}}", &accept))
}

const INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>SQLite Database Explorer</title>
  <style>
    body { font-family: Arial, sans-serif; margin: 2rem; color: #1d1d1f; max-width: 860px; }
    h1 { margin-bottom: 0.5rem; }
    .card { border: 1px solid #ddd; padding: 1rem; border-radius: 8px; margin-bottom: 1rem; }
    label { display: block; margin-top: 0.75rem; font-weight: 600; }
    input[type=text] { width: 100%; padding: 0.5rem; box-sizing: border-box; }
    #status { color: #555; margin-top: 0.5rem; min-height: 1.2em; }
    #error { display: none; background: #fdecea; color: #8a1c12; border: 1px solid #f5c2bd; padding: 0.75rem 1rem; border-radius: 6px; }
    #answer { display: none; }
    pre { background: #f6f8fa; padding: 1rem; overflow: auto; white-space: pre-wrap; }
  </style>
</head>
<body>
  <h1>SQLite Database Explorer</h1>

  <div class="card">
    <label for="fileInput">Choose a SQLite database file</label>
    <input id="fileInput" type="file" accept="{{ACCEPT}}" />
    <label for="question">Enter your natural language query:</label>
    <input id="question" type="text" autocomplete="off" />
    <div id="status"></div>
  </div>

  <div id="error"></div>

  <div id="answer" class="card">
    <strong>Result:</strong>
    <pre id="result"></pre>
  </div>

  <script>
    const fileInput = document.getElementById('fileInput');
    const question = document.getElementById('question');
    const statusLine = document.getElementById('status');
    const errorBanner = document.getElementById('error');
    const answer = document.getElementById('answer');
    const result = document.getElementById('result');

    function reset() {
      errorBanner.style.display = 'none';
      answer.style.display = 'none';
    }

    async function submit() {
      reset();
      if (!fileInput.files.length) {
        statusLine.textContent = '';
        return;
      }
      const formData = new FormData();
      formData.append('file', fileInput.files[0]);
      formData.append('question', question.value);
      statusLine.textContent = question.value.trim() ? 'Thinking...' : 'Checking database...';

      let json;
      try {
        const res = await fetch('/api/query', { method: 'POST', body: formData });
        json = await res.json();
      } catch (e) {
        json = { status: 'error', kind: 'setup', message: String(e) };
      }
      statusLine.textContent = '';

      if (json.status === 'success') {
        result.textContent = json.result;
        answer.style.display = 'block';
      } else if (json.status === 'error') {
        errorBanner.textContent = 'An error occurred: ' + json.message;
        errorBanner.style.display = 'block';
      }
    }

    fileInput.addEventListener('change', submit);
    question.addEventListener('keydown', (event) => {
      if (event.key === 'Enter') {
        event.preventDefault();
        submit();
      }
    });
  </script>
</body>
</html>"#;
