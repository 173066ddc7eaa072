/// Subscription pattern over `/`-separated state paths.
///
/// MQTT-style wildcards:
/// - `+` matches exactly one level
/// - `#` matches every remaining level, including none (must be last;
///   anything after it is ignored)
///
/// ```ignore
/// let topic = Topic::parse("viewer/items/+");
/// assert!(topic.matches("viewer/items/s1"));
/// assert!(!topic.matches("viewer/items"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    raw: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Exact(String),
    Single,
    Multi,
}

impl Topic {
    pub fn parse(pattern: &str) -> Self {
        let mut segments = Vec::new();
        for part in pattern.split('/') {
            match part {
                "#" => {
                    segments.push(Segment::Multi);
                    break;
                }
                "+" => segments.push(Segment::Single),
                exact => segments.push(Segment::Exact(exact.to_string())),
            }
        }
        Self {
            raw: pattern.to_string(),
            segments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, path: &str) -> bool {
        let mut levels = path.split('/');
        for segment in &self.segments {
            match segment {
                Segment::Multi => return true,
                Segment::Single => {
                    if levels.next().is_none() {
                        return false;
                    }
                }
                Segment::Exact(want) => {
                    if levels.next() != Some(want.as_str()) {
                        return false;
                    }
                }
            }
        }
        levels.next().is_none()
    }
}
