//! `:name` placeholder substitution for validation and dispatcher messages.

/// Replaces every `:key` in `template` with the matching value.
///
/// Longer keys are substituted first so that `:min` never clobbers the
/// prefix of `:minimum`.
#[must_use]
pub fn render<K, V>(template: &str, replacements: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut ordered: Vec<&(K, V)> = replacements.iter().collect();
    ordered.sort_by_key(|(key, _)| std::cmp::Reverse(key.as_ref().len()));

    let mut message = template.to_string();
    for (key, value) in ordered {
        message = message.replace(&format!(":{}", key.as_ref()), value.as_ref());
    }
    message
}
