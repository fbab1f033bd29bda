/// Character data collected between two tag boundaries.
///
/// Line endings are normalized as data arrives: `\r\n` and a lone `\r` both
/// become `\n`, including a `\r\n` pair split across two chunks.
#[derive(Debug, Default)]
pub(crate) struct CharBuffer {
    text: String,
    // Last chunk ended with `\r`; a leading `\n` in the next chunk belongs to it.
    after_cr: bool,
}

impl CharBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        let mut rest = chunk;
        if self.after_cr {
            self.after_cr = false;
            if let Some(stripped) = rest.strip_prefix('\n') {
                rest = stripped;
            }
        }

        while let Some(pos) = rest.find('\r') {
            self.text.push_str(&rest[..pos]);
            self.text.push('\n');
            rest = &rest[pos + 1..];
            if rest.is_empty() {
                self.after_cr = true;
            } else if let Some(stripped) = rest.strip_prefix('\n') {
                rest = stripped;
            }
        }
        self.text.push_str(rest);
    }

    /// Drains the buffer, returning its content untouched.
    pub fn take(&mut self) -> String {
        self.after_cr = false;
        std::mem::take(&mut self.text)
    }
}

pub(crate) fn trimmed(text: String) -> Option<String> {
    let t = text.trim();
    if t.is_empty() {
        None
    } else if t.len() == text.len() {
        Some(text)
    } else {
        Some(t.to_string())
    }
}
