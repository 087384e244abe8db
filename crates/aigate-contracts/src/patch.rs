use serde::{Deserialize, Deserializer};

/// A field of a partial update.
///
/// `Absent` means the key was not in the body, `Null` means it was sent as
/// `null`. Fields must carry `#[serde(default)]` so that a missing key stays
/// `Absent`.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch<T> {
    Absent,
    Null,
    Set(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Self::Absent
    }
}

impl<T> Patch<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn as_set(&self) -> Option<&T> {
        match self {
            Self::Set(value) => Some(value),
            Self::Absent | Self::Null => None,
        }
    }

    /// Applies the patch to a nullable field: `null` clears it.
    pub fn apply_to(self, target: &mut Option<T>) {
        match self {
            Self::Absent => {}
            Self::Null => *target = None,
            Self::Set(value) => *target = Some(value),
        }
    }
}

impl<'de, T> Deserialize<'de> for Patch<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(|value| match value {
            Some(value) => Self::Set(value),
            None => Self::Null,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::Patch;

    #[derive(Deserialize)]
    struct Body {
        #[serde(default)]
        name: Patch<String>,
        #[serde(default)]
        description: Patch<String>,
        #[serde(default)]
        note: Patch<String>,
    }

    #[test]
    fn distinguishes_absent_null_and_set() {
        let body: Body = serde_json::from_str(r#"{"name":"a","description":null}"#).expect("body");
        assert_eq!(body.name, Patch::Set("a".to_string()));
        assert_eq!(body.description, Patch::Null);
        assert!(body.note.is_absent());
    }

    #[test]
    fn empty_string_is_a_value_not_an_absence() {
        let body: Body = serde_json::from_str(r#"{"name":""}"#).expect("body");
        let mut target = Some("old".to_string());
        body.name.apply_to(&mut target);
        assert_eq!(target.as_deref(), Some(""));
    }
}
