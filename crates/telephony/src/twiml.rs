//! TwiML response builders

/// Escape the characters XML cares about in attribute and text positions.
fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Connect the call to the per-call audio WebSocket.
pub fn connect_stream(ws_url: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Connect>
    <Stream url="{}"/>
  </Connect>
</Response>"#,
        escape(ws_url)
    )
}

/// Fixed spoken error when no assistant is configured for the number.
pub fn error_response(message: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Say>{}</Say>
  <Hangup/>
</Response>"#,
        escape(message)
    )
}

/// Hand the call to a phone number via a conference-style dial.
pub fn dial_number(number: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Dial><Number>{}</Number></Dial>
</Response>"#,
        escape(number)
    )
}

/// Hand the call to a SIP endpoint.
pub fn dial_sip(uri: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Dial><Sip>{}</Sip></Dial>
</Response>"#,
        escape(uri)
    )
}
