use crate::{EntityId, Target, WILDCARD};

/// Derive the identifier an ability is stored under: the name, then the
/// target type and target id when present, joined by `-` and lowercased.
pub fn canonical_identifier(
    name: &str,
    target_type: Option<&str>,
    target_id: Option<&EntityId>,
) -> String {
    let mut identifier = name.to_owned();

    if let Some(target_type) = target_type.filter(|target_type| !target_type.is_empty()) {
        identifier.push('-');
        identifier.push_str(target_type);
    }

    if let Some(target_id) = target_id.filter(|target_id| !target_id.is_empty()) {
        identifier.push('-');
        identifier.push_str(target_id.as_str());
    }

    identifier.to_lowercase()
}

/// Enumerate every stored identifier that could satisfy a check of `ability`
/// against `target`. For an instance the four type-level identifiers come
/// first and the two instance ones are appended.
///
/// The order carries no meaning for resolution but is kept stable so that
/// traces of a decision read predictably.
pub fn compile(ability: &str, target: Option<&Target>) -> Vec<String> {
    let ability = ability.to_lowercase();

    let Some(target) = target else {
        return vec![ability, format!("{WILDCARD}-{WILDCARD}"), WILDCARD.to_owned()];
    };

    let (type_tag, id) = match target {
        Target::Any => {
            return vec![
                format!("{ability}-{WILDCARD}"),
                format!("{WILDCARD}-{WILDCARD}"),
            ];
        }
        Target::Type { type_tag } => (type_tag.to_lowercase(), None),
        Target::Instance { type_tag, id } => (
            type_tag.to_lowercase(),
            Some(id).filter(|id| !id.is_empty()),
        ),
    };

    let mut identifiers = vec![
        format!("{ability}-{type_tag}"),
        format!("{ability}-{WILDCARD}"),
        format!("{WILDCARD}-{type_tag}"),
        format!("{WILDCARD}-{WILDCARD}"),
    ];

    if let Some(id) = id {
        let id = id.as_str().to_lowercase();
        identifiers.push(format!("{ability}-{type_tag}-{id}"));
        identifiers.push(format!("{WILDCARD}-{type_tag}-{id}"));
    }

    identifiers
}
