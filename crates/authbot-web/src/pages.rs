//! HTML pages shown in the user's browser.

const STYLE: &str = "<style>body{text-align:center;padding:150px;font:20px Helvetica,sans-serif;color:#333}\
h1{font-size:40px}article{display:block;text-align:left;width:650px;margin:0 auto}\
code{font-family:Consolas,monaco,monospace;font-size:32px}</style>";

/// Escape text for inclusion in HTML element content or attributes.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Page carrying the magic code after a successful sign-in.
pub fn magic_code_page(display_name: &str, magic_code: &str) -> String {
    format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>Signed in</title>{STYLE}</head>\
         <body><article><h1>Welcome {}!</h1><div>\
         <p>Please copy this code and paste it back to your chat so your authentication can complete:</p>\
         <code>{}</code></div></article></body></html>",
        escape(display_name),
        escape(magic_code)
    )
}

/// Generic failure page. `detail` is shown verbatim after escaping.
pub fn failure_page(detail: &str) -> String {
    format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>Sign-in failed</title>{STYLE}</head>\
         <body><article><h1>Sign-in failed</h1>\
         <p>{}</p><p>Return to your chat and start the sign-in again.</p></article></body></html>",
        escape(detail)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_covers_markup_characters() {
        assert_eq!(
            escape(r#"<a href="x">O'Neil & co</a>"#),
            "&lt;a href=&quot;x&quot;&gt;O&#39;Neil &amp; co&lt;/a&gt;"
        );
    }

    #[test]
    fn magic_code_page_shows_name_and_code() {
        let page = magic_code_page("Ada", "ab12cd34");
        assert!(page.contains("Welcome Ada!"));
        assert!(page.contains("<code>ab12cd34</code>"));
    }

    #[test]
    fn magic_code_page_escapes_name() {
        let page = magic_code_page("<script>alert(1)</script>", "ab12cd34");
        assert!(!page.contains("<script>"));
        assert!(page.contains("&lt;script&gt;"));
    }
}
