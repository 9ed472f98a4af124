use stan_client::DEFAULT_NATS_URL;

const SCHEME: &str = "nats://";

/// Normalize server addresses: drop empty entries, prefix bare `host:port` entries with
/// `nats://` and fall back to the default server when nothing is left.
///
/// The result is never empty, and normalizing it again yields the same list.
pub fn normalize_addrs<I, S>(addrs: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let addrs: Vec<String> = addrs
        .into_iter()
        .filter_map(|addr| {
            let addr = addr.as_ref();
            if addr.is_empty() {
                None
            } else if addr.starts_with(SCHEME) {
                Some(addr.to_string())
            } else {
                Some(format!("{SCHEME}{addr}"))
            }
        })
        .collect();
    if addrs.is_empty() {
        vec![DEFAULT_NATS_URL.to_string()]
    } else {
        addrs
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_case::test_case;

    #[test_case(&[], &["nats://127.0.0.1:4222"]; "no addresses")]
    #[test_case(&["", ""], &["nats://127.0.0.1:4222"]; "only empty entries")]
    #[test_case(&["localhost:4222"], &["nats://localhost:4222"]; "bare host")]
    #[test_case(&["nats://a:4222", "", "b:4222"], &["nats://a:4222", "nats://b:4222"]; "mixed")]
    fn test_normalize(addrs: &[&str], expected: &[&str]) {
        assert_eq!(normalize_addrs(addrs), expected);
    }

    #[test_case(&[]; "empty")]
    #[test_case(&["a:1", "nats://b:2", ""]; "mixed")]
    fn test_normalize_idempotent(addrs: &[&str]) {
        let once = normalize_addrs(addrs);
        assert!(!once.is_empty());
        assert_eq!(normalize_addrs(&once), once);
    }
}
