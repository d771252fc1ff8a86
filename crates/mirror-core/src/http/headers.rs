//! Response header collection for curl transfers.

/// Headers of the final response of a transfer.
///
/// curl hands every header line of every response (redirects, `100 Continue`)
/// to the header callback; a new status line starts a fresh block so only the
/// last response's headers remain.
#[derive(Debug, Clone, Default)]
pub struct ResponseHeaders {
    status: Option<u32>,
    fields: Vec<(String, String)>,
}

impl ResponseHeaders {
    /// Feed one raw header line from curl's header callback.
    pub fn push_line(&mut self, raw: &[u8]) {
        let Ok(line) = std::str::from_utf8(raw) else {
            return;
        };
        let line = line.trim_end();
        if line.starts_with("HTTP/") {
            self.fields.clear();
            self.status = line
                .split_whitespace()
                .nth(1)
                .and_then(|code| code.parse().ok());
            return;
        }
        if let Some((name, value)) = line.split_once(':') {
            self.fields
                .push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    /// True once a final (2xx) status line arrived.
    pub fn is_success(&self) -> bool {
        matches!(self.status, Some(code) if (200..300).contains(&code))
    }

    /// First value of header `name` (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.get("content-length")?.parse().ok()
    }

    pub fn content_disposition(&self) -> Option<&str> {
        self.get("content-disposition")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(lines: &[&str]) -> ResponseHeaders {
        let mut h = ResponseHeaders::default();
        for l in lines {
            h.push_line(format!("{}\r\n", l).as_bytes());
        }
        h
    }

    #[test]
    fn content_length_and_disposition() {
        let h = collect(&[
            "HTTP/1.1 200 OK",
            "Content-Length: 12345",
            "Content-Disposition: attachment; filename=\"f.bin\"",
            "",
        ]);
        assert_eq!(h.content_length(), Some(12345));
        assert!(h.content_disposition().unwrap().contains("f.bin"));
        assert_eq!(h.get("CONTENT-LENGTH"), Some("12345"));
    }

    #[test]
    fn redirect_headers_are_discarded() {
        let h = collect(&[
            "HTTP/1.1 302 Found",
            "Location: /elsewhere",
            "Content-Length: 0",
            "",
            "HTTP/1.1 200 OK",
            "Content-Length: 99",
            "",
        ]);
        assert_eq!(h.content_length(), Some(99));
        assert!(h.is_success());
        assert!(h.get("location").is_none());
    }

    #[test]
    fn missing_or_bad_length() {
        let h = collect(&["HTTP/1.1 200 OK", "Content-Length: lots"]);
        assert_eq!(h.content_length(), None);
        let h = collect(&["HTTP/1.1 200 OK", "Transfer-Encoding: chunked"]);
        assert_eq!(h.content_length(), None);
    }
}
