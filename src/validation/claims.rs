use serde_json::{Map, Value};

/// ID token claims that describe the token rather than the user.
pub const PROTOCOL_CLAIMS: &[&str] = &[
    "nonce", "at_hash", "iat", "nbf", "exp", "aud", "iss", "c_hash",
];

/// Drops [`PROTOCOL_CLAIMS`] from a profile.
pub fn filter_protocol_claims(profile: &mut Map<String, Value>) {
    for claim in PROTOCOL_CLAIMS {
        profile.remove(*claim);
    }
}

/// Merges `additional` into `base`.
///
/// With `combine` set, a claim present on both sides with different values
/// becomes an array of the distinct values; otherwise `additional` wins.
pub fn merge_claims(
    base: &Map<String, Value>,
    additional: &Map<String, Value>,
    combine: bool,
) -> Map<String, Value> {
    let mut result = base.clone();
    for (name, value) in additional {
        let Some(existing) = result.get_mut(name) else {
            result.insert(name.clone(), value.clone());
            continue;
        };
        if !combine || existing == value {
            *existing = value.clone();
            continue;
        }

        let mut values = match existing.take() {
            Value::Array(values) => values,
            other => vec![other],
        };
        let incoming = match value {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        };
        for item in incoming {
            if !values.contains(&item) {
                values.push(item);
            }
        }
        *existing = Value::Array(values);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn protocol_claims_are_removed() {
        let mut profile = map(json!({"sub": "a", "iss": "op", "nonce": "n", "email": "a@x"}));
        filter_protocol_claims(&mut profile);
        assert_eq!(Value::Object(profile), json!({"sub": "a", "email": "a@x"}));
    }

    #[test]
    fn differing_values_combine_into_array() {
        let base = map(json!({"sub": "a", "role": "admin", "groups": ["x"]}));
        let extra = map(json!({"sub": "a", "role": "user", "groups": ["x", "y"], "name": "A"}));

        let merged = merge_claims(&base, &extra, true);
        assert_eq!(merged["sub"], json!("a"));
        assert_eq!(merged["role"], json!(["admin", "user"]));
        assert_eq!(merged["groups"], json!(["x", "y"]));
        assert_eq!(merged["name"], json!("A"));
    }

    #[test]
    fn without_combine_additional_claims_win() {
        let base = map(json!({"role": "admin"}));
        let extra = map(json!({"role": "user"}));
        assert_eq!(merge_claims(&base, &extra, false)["role"], json!("user"));
    }
}
