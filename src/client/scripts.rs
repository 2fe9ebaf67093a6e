//! Browser runtime scripts
//!
//! One script per transport, generated with the endpoint, the version the
//! page was served at and the reconnect schedule substituted in.

use super::runtime::ReconnectPolicy;
use crate::config::TransportKind;

/// Values substituted into a client script
#[derive(Debug, Clone)]
pub struct ScriptOptions {
    pub kind: TransportKind,
    pub endpoint: &'static str,
    pub version: u64,
    pub poll_interval_ms: u64,
}

/// Swaps stylesheet links for cache-busted clones. The original is removed
/// only once its clone has loaded, and a link already being replaced is
/// skipped so overlapping patches never stack up duplicates.
const APPLY_CSS: &str = r#"
  function applyAllCSS(v) {
    document.querySelectorAll('link[rel="stylesheet"]').forEach(link => {
      if (link.dataset.devReloadReplaced) return;
      link.dataset.devReloadReplaced = '1';
      const url = new URL(link.href, location.origin);
      url.searchParams.set('v', v);
      const clone = link.cloneNode();
      delete clone.dataset.devReloadReplaced;
      clone.href = url.toString();
      clone.addEventListener('load', () => link.remove(), { once: true });
      clone.addEventListener('error', () => {
        clone.remove();
        delete link.dataset.devReloadReplaced;
      }, { once: true });
      link.after(clone);
    });
  }
"#;

const POLLING_SCRIPT: &str = r#"
(() => {
  const STATUS_PATH = '__ENDPOINT__';
  const POLL_INTERVAL = __POLL_INTERVAL__;
  let currentVersion = __VERSION__;
  let isPolling = false;
  let lastError = null;
__APPLY_CSS__
  async function pollStatus() {
    if (isPolling) return;
    isPolling = true;
    try {
      const response = await fetch(STATUS_PATH, {
        cache: 'no-cache',
        headers: { 'Accept': 'application/json' }
      });
      if (!response.ok) {
        console.warn('[dev-reload] Poll failed:', response.status);
        return;
      }
      const status = await response.json();
      if (status.error) {
        const sig = JSON.stringify(status.error);
        if (sig !== lastError) {
          lastError = sig;
          console.error('[dev-reload][build-error]', status.error);
        }
      } else {
        lastError = null;
      }
      if (status.version > currentVersion) {
        currentVersion = status.version;
        if (status.cssOnly) applyAllCSS(status.version); else location.reload();
      }
    } catch (error) {
      console.warn('[dev-reload] Poll error:', error);
    } finally {
      isPolling = false;
    }
  }

  setInterval(pollStatus, POLL_INTERVAL);
  pollStatus();

  window.__devReload = {
    version: () => currentVersion,
    forceReload: () => location.reload()
  };
})();
"#;

const SSE_SCRIPT: &str = r#"
(() => {
  const SSE_PATH = '__ENDPOINT__';
  const RETRY_MS = __RETRY_MS__;
  let currentVersion = __VERSION__;
__APPLY_CSS__
  function connect() {
    const es = new EventSource(SSE_PATH);
    es.onmessage = (ev) => {
      try {
        const msg = JSON.parse(ev.data);
        switch (msg.type) {
          case 'build-end':
            if (msg.version > currentVersion) {
              currentVersion = msg.version;
              if (msg.cssOnly) applyAllCSS(msg.version); else location.reload();
            }
            break;
          case 'build-error':
          case 'hmr-error':
            console.error('[dev-reload][' + msg.type + ']', msg.error);
            break;
        }
      } catch {}
    };
    es.onerror = () => {
      console.warn('[dev-reload]', 'EventSource failed, retrying...');
      es.close();
      setTimeout(connect, RETRY_MS);
    };
  }
  if (window.EventSource) connect();

  window.__devReload = {
    version: () => currentVersion,
    forceReload: () => location.reload()
  };
})();
"#;

const SOCKET_SCRIPT: &str = r#"
(() => {
  const WS_PATH = '__ENDPOINT__';
  const MAX_RECONNECT_ATTEMPTS = __MAX_ATTEMPTS__;
  const BASE_RECONNECT_DELAY = __BASE_DELAY__;
  const BACKOFF_FACTOR = __FACTOR__;
  const MAX_RECONNECT_DELAY = __MAX_DELAY__;
  let currentVersion = __VERSION__;
  let ws;
  let reconnectTimer;
  let reconnectAttempts = 0;
__APPLY_CSS__
  function onBuild(version, cssOnly) {
    if (version <= currentVersion) return;
    currentVersion = version;
    if (cssOnly) applyAllCSS(version); else location.reload();
  }

  function connect() {
    const protocol = location.protocol === 'https:' ? 'wss:' : 'ws:';
    // No subprotocol, so proxies treat this as a plain socket
    const socket = new WebSocket(protocol + '//' + location.host + WS_PATH);
    ws = socket;

    socket.addEventListener('open', () => {
      reconnectAttempts = 0;
      clearTimeout(reconnectTimer);
    });

    socket.addEventListener('message', (event) => {
      try {
        const msg = JSON.parse(event.data);
        switch (msg.type) {
          case 'update':
            onBuild(msg.version, msg.cssOnly);
            break;
          case 'full-reload':
            onBuild(msg.version, false);
            break;
          case 'error':
            console.error('[dev-reload] Build error:', msg.err);
            break;
          case 'ping':
            if (socket.readyState === WebSocket.OPEN) {
              socket.send(JSON.stringify({ type: 'pong', timestamp: Date.now() }));
            }
            break;
        }
      } catch (err) {
        console.error('[dev-reload] Error handling message:', err);
      }
    });

    socket.addEventListener('close', () => {
      // A socket replaced by reconnect() must not schedule another one
      if (socket !== ws) return;
      if (reconnectAttempts < MAX_RECONNECT_ATTEMPTS) {
        const delay = Math.min(
          BASE_RECONNECT_DELAY * Math.pow(BACKOFF_FACTOR, reconnectAttempts),
          MAX_RECONNECT_DELAY
        );
        reconnectAttempts++;
        reconnectTimer = setTimeout(connect, delay);
      } else {
        console.error('[dev-reload] Max reconnection attempts reached. Please refresh the page.');
      }
    });

    socket.addEventListener('error', (err) => {
      console.error('[dev-reload] WebSocket error:', err);
    });
  }

  connect();

  window.__devReload = {
    version: () => currentVersion,
    forceReload: () => location.reload(),
    reconnect: () => {
      reconnectAttempts = 0;
      clearTimeout(reconnectTimer);
      const previous = ws;
      connect();
      if (previous) previous.close();
    },
    status: () => ({
      readyState: ws ? ws.readyState : undefined,
      reconnectAttempts,
      state: ['CONNECTING', 'OPEN', 'CLOSING', 'CLOSED'][ws ? ws.readyState : -1] || 'UNKNOWN'
    })
  };
})();
"#;

/// Generate the browser runtime for a transport
pub fn client_script(options: &ScriptOptions) -> String {
    let template = match options.kind {
        TransportKind::Polling => POLLING_SCRIPT,
        TransportKind::Sse => SSE_SCRIPT,
        TransportKind::Websocket => SOCKET_SCRIPT,
    };

    let mut script = template
        .replace("__APPLY_CSS__", APPLY_CSS)
        .replace("__ENDPOINT__", options.endpoint)
        .replace("__VERSION__", &options.version.to_string())
        .replace("__POLL_INTERVAL__", &options.poll_interval_ms.to_string());

    match ReconnectPolicy::for_transport(options.kind) {
        ReconnectPolicy::Exponential {
            base,
            factor,
            cap,
            max_attempts,
        } => {
            script = script
                .replace("__MAX_ATTEMPTS__", &max_attempts.to_string())
                .replace("__BASE_DELAY__", &base.as_millis().to_string())
                .replace("__FACTOR__", &factor.to_string())
                .replace("__MAX_DELAY__", &cap.as_millis().to_string());
        }
        ReconnectPolicy::Fixed { delay } => {
            script = script.replace("__RETRY_MS__", &delay.as_millis().to_string());
        }
        ReconnectPolicy::None => {}
    }

    script
}

/// Inject a module script into an HTML page
///
/// Goes before `</head>` so it runs early, falling back to `</body>` and
/// finally to the start of the document.
pub fn inject_client(html: &str, script: &str) -> String {
    let tag = format!("<script type=\"module\">{}</script>\n", script);

    let lower = html.to_ascii_lowercase();
    if let Some(pos) = lower.find("</head>").or_else(|| lower.rfind("</body>")) {
        let mut result = String::with_capacity(html.len() + tag.len());
        result.push_str(&html[..pos]);
        result.push_str(&tag);
        result.push_str(&html[pos..]);
        result
    } else {
        format!("{}{}", tag, html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(kind: TransportKind, endpoint: &'static str) -> ScriptOptions {
        ScriptOptions {
            kind,
            endpoint,
            version: 7,
            poll_interval_ms: 2000,
        }
    }

    #[test]
    fn test_no_placeholder_left_behind() {
        for (kind, endpoint) in [
            (TransportKind::Polling, "/__dev/reload/status"),
            (TransportKind::Sse, "/__dev/reload"),
            (TransportKind::Websocket, "/__dev_hmr"),
        ] {
            let script = client_script(&options(kind, endpoint));
            assert!(!script.contains("__ENDPOINT__"), "{kind}");
            assert!(!script.contains("__VERSION__"), "{kind}");
            assert!(!script.contains("__APPLY_CSS__"), "{kind}");
            assert!(!script.contains("__RETRY_MS__"), "{kind}");
            assert!(!script.contains("__MAX_ATTEMPTS__"), "{kind}");
            assert!(script.contains(endpoint));
            assert!(script.contains("let currentVersion = 7;"));
            assert!(script.contains("window.__devReload"));
            assert!(script.contains("applyAllCSS"));
        }
    }

    #[test]
    fn test_socket_script_carries_backoff() {
        let script = client_script(&options(TransportKind::Websocket, "/__dev_hmr"));
        assert!(script.contains("const MAX_RECONNECT_ATTEMPTS = 10;"));
        assert!(script.contains("const BASE_RECONNECT_DELAY = 1000;"));
        assert!(script.contains("const BACKOFF_FACTOR = 1.5;"));
        assert!(script.contains("const MAX_RECONNECT_DELAY = 30000;"));
        assert!(script.contains("reconnect:"));
        assert!(script.contains("status:"));
    }

    #[test]
    fn test_socket_script_ignores_close_of_replaced_socket() {
        let script = client_script(&options(TransportKind::Websocket, "/__dev_hmr"));
        assert!(script.contains("if (socket !== ws) return;"));

        // The new socket is current before the old one is closed
        let reconnect = &script[script.find("reconnect:").unwrap()..];
        let connect_at = reconnect.find("connect();").unwrap();
        let close_at = reconnect.find("previous.close()").unwrap();
        assert!(connect_at < close_at);
    }

    #[test]
    fn test_polling_script_interval() {
        let script = client_script(&options(TransportKind::Polling, "/__dev/reload/status"));
        assert!(script.contains("const POLL_INTERVAL = 2000;"));
        assert!(!script.contains("reconnect:"));
    }

    #[test]
    fn test_inject_before_head_close() {
        let html = "<html><head><title>x</title></head><body></body></html>";
        let out = inject_client(html, "console.log(1)");
        let script_at = out.find("<script type=\"module\">").unwrap();
        assert!(script_at < out.find("</head>").unwrap());
    }

    #[test]
    fn test_inject_falls_back_to_body_then_prepend() {
        let out = inject_client("<body><p>hi</p></BODY>", "x()");
        assert!(out.find("<script").unwrap() < out.find("</BODY>").unwrap());

        let out = inject_client("<p>fragment</p>", "x()");
        assert!(out.starts_with("<script type=\"module\">x()</script>"));
    }
}
