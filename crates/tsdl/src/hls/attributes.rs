use std::collections::HashMap;

/// Attribute list of a tag line, e.g. `BANDWIDTH=240000,CODECS="avc1.42e00a,mp4a.40.2"`.
///
/// Quoted values are stored without their quotes and may contain commas.
/// When a name appears more than once the last value wins.
#[derive(Debug, Default)]
pub struct Attributes<'a> {
    values: HashMap<&'a str, &'a str>,
}

impl<'a> Attributes<'a> {
    pub fn parse(input: &'a str) -> Self {
        let mut values = HashMap::new();
        let mut rest = input;

        loop {
            rest = rest.trim_start_matches(|c: char| c == ',' || c.is_whitespace());
            if rest.is_empty() {
                break;
            }

            let Some((name, after)) = rest.split_once('=') else {
                break;
            };

            let (value, remaining) = match after.strip_prefix('"') {
                Some(quoted) => match quoted.find('"') {
                    Some(end) => (&quoted[..end], &quoted[end + 1..]),
                    // unterminated quote, take everything
                    None => (quoted, ""),
                },
                None => match after.find(',') {
                    Some(end) => (after[..end].trim(), &after[end..]),
                    None => (after.trim(), ""),
                },
            };

            let name = name.trim();
            if !name.is_empty() {
                values.insert(name, value);
            }

            rest = remaining.split_once(',').map(|(_, next)| next).unwrap_or("");
        }

        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&'a str> {
        self.values.get(name).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
