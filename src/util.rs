//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// This is intentionally simple (no nested/conditional logic).
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Best-effort plain-text recovery from an uploaded document.
/// Decodes as lossy UTF-8, drops control characters and replacement glyphs,
/// and collapses whitespace runs. Binary formats yield whatever readable
/// fragments they contain; an empty result is the caller's signal to proceed
/// without source text.
pub fn extract_plain_text(bytes: &[u8]) -> String {
  let decoded = String::from_utf8_lossy(bytes);
  let mut out = String::with_capacity(decoded.len());
  let mut last_was_space = true;
  for ch in decoded.chars() {
    let keep = if ch == '\n' {
      true
    } else if ch.is_control() || ch == '\u{FFFD}' {
      false
    } else {
      true
    };
    if !keep {
      continue;
    }
    if ch.is_whitespace() && ch != '\n' {
      if last_was_space {
        continue;
      }
      out.push(' ');
      last_was_space = true;
    } else {
      out.push(ch);
      last_was_space = ch == '\n';
    }
  }
  out.trim().to_string()
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    s.to_string()
  } else {
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
      end -= 1;
    }
    format!("{}… ({} bytes total)", &s[..end], s.len())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fill_template_replaces_all_occurrences() {
    let out = fill_template("{a} and {b} and {a}", &[("a", "1"), ("b", "2")]);
    assert_eq!(out, "1 and 2 and 1");
  }

  #[test]
  fn fill_template_leaves_unknown_keys() {
    assert_eq!(fill_template("{missing}", &[("a", "1")]), "{missing}");
  }

  #[test]
  fn extract_plain_text_collapses_whitespace() {
    let out = extract_plain_text("Um   texto\t de  apoio.\n\nSegunda linha.".as_bytes());
    assert_eq!(out, "Um texto de apoio.\n\nSegunda linha.");
  }

  #[test]
  fn extract_plain_text_drops_binary_noise() {
    let mut bytes = vec![0u8, 1, 2, 0xff, 0xfe];
    bytes.extend_from_slice("ciclo da ".as_bytes());
    bytes.push(0x07);
    bytes.extend_from_slice("água".as_bytes());
    let out = extract_plain_text(&bytes);
    assert_eq!(out, "ciclo da água");
  }

  #[test]
  fn trunc_for_log_respects_char_boundaries() {
    let s = "áéíóú";
    let out = trunc_for_log(s, 3);
    assert!(out.starts_with('á'));
    assert!(out.contains("bytes total"));
  }
}
