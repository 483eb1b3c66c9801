// core/src/catalog/slug.rs

/// Lower-case, ASCII-alphanumeric words joined by single dashes.
pub fn slugify(raw: &str) -> String {
  let mut slug = String::with_capacity(raw.len());
  let mut pending_dash = false;
  for c in raw.chars() {
    if c.is_ascii_alphanumeric() {
      if pending_dash && !slug.is_empty() {
        slug.push('-');
      }
      pending_dash = false;
      slug.push(c.to_ascii_lowercase());
    } else {
      pending_dash = true;
    }
  }
  slug
}

#[cfg(test)]
mod tests {
  use super::slugify;

  #[test]
  fn collapses_separators_and_lowercases() {
    assert_eq!(slugify("  Red  Coffee Mug! "), "red-coffee-mug");
    assert_eq!(slugify("USB-C / HDMI adapter"), "usb-c-hdmi-adapter");
    assert_eq!(slugify("***"), "");
  }
}
