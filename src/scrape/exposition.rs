//! Prometheus text exposition helpers
//!
//! Scraped payloads are treated as opaque lines. The only rewriting done here is
//! adding pod identity labels so identical series from different pods stay
//! distinguishable once concatenated.

/// Label carrying the scraped pod's name
pub const POD_NAME_LABEL: &str = "k8s_pod_name";

/// Label carrying the scraped pod's namespace
pub const NAMESPACE_LABEL: &str = "k8s_namespace";

/// Scrape outcome reported by the synthesized `up` series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// The target answered with a successful status and a readable body
    Up,
    /// The scrape failed for any reason
    Down,
}

impl Liveness {
    /// Sample value written on the `up` line
    pub fn as_value(self) -> u8 {
        match self {
            Liveness::Up => 1,
            Liveness::Down => 0,
        }
    }
}

fn identity_labels(name: &str, namespace: &str) -> String {
    format!(
        "{}=\"{}\",{}=\"{}\"",
        POD_NAME_LABEL, name, NAMESPACE_LABEL, namespace
    )
}

/// Add pod identity labels to every sample line of a scraped payload
///
/// - Comment (`#...`) and empty lines are left as they are.
/// - Lines with a label block get the identity labels inserted first inside it.
/// - Lines of the exact shape `<name> <value>` get a new label block.
/// - Anything else is passed through verbatim.
///
/// Line structure is preserved, including a trailing newline.
///
/// # Examples
///
/// ```
/// use metrics_k8s_proxy::scrape::exposition::inject_identity;
///
/// assert_eq!(
///     inject_identity("m 5", "p", "n"),
///     r#"m{k8s_pod_name="p",k8s_namespace="n"} 5"#
/// );
/// ```
pub fn inject_identity(text: &str, name: &str, namespace: &str) -> String {
    let labels = identity_labels(name, namespace);

    text.split('\n')
        .map(|line| {
            if line.is_empty() || line.starts_with('#') {
                return line.to_string();
            }

            if line.contains('{') {
                return line.replacen('{', &format!("{{{},", labels), 1);
            }

            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next(), fields.next()) {
                (Some(metric), Some(value), None) => {
                    format!("{}{{{}}} {}", metric, labels, value)
                }
                _ => line.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the `up` line for a pod, newline-terminated
pub fn liveness_line(name: &str, namespace: &str, liveness: Liveness) -> String {
    format!(
        "up{{{}}} {}\n",
        identity_labels(name, namespace),
        liveness.as_value()
    )
}

/// Append the `up` line to a payload, separated by a newline
///
/// A failed scrape passes an empty payload and so produces a leading blank line.
/// Downstream consumers already tolerate that shape, so it is kept.
pub fn append_liveness(payload: &str, name: &str, namespace: &str, liveness: Liveness) -> String {
    format!("{}\n{}", payload, liveness_line(name, namespace, liveness))
}
