use pipelex_core::{ExtractSkill, ImgGenSkill, LlmSkill, default_model_choice};
use pipelex_routing::{ModelCategory, ModelDeck};

fn unresolved<'a>(
    deck: &ModelDeck,
    category: ModelCategory,
    choices: impl IntoIterator<Item = &'a str>,
) -> Vec<&'a str> {
    choices
        .into_iter()
        .filter(|choice| deck.resolve_choice(category, choice).is_err())
        .collect()
}

#[test]
fn llm_skills_builtin_deck_expected_all_resolve() {
    let deck = ModelDeck::builtin();
    let invalid = unresolved(
        &deck,
        ModelCategory::Llm,
        LlmSkill::ALL.into_iter().map(LlmSkill::model_choice),
    );
    assert!(invalid.is_empty(), "LLM skills missing from the deck: {invalid:?}");
}

#[test]
fn img_gen_skills_builtin_deck_expected_all_resolve() {
    let deck = ModelDeck::builtin();
    let invalid = unresolved(
        &deck,
        ModelCategory::ImgGen,
        ImgGenSkill::ALL.into_iter().map(ImgGenSkill::model_choice),
    );
    assert!(invalid.is_empty(), "image generation skills missing from the deck: {invalid:?}");
}

#[test]
fn extract_skills_builtin_deck_expected_all_resolve() {
    let deck = ModelDeck::builtin();
    let invalid = unresolved(
        &deck,
        ModelCategory::Extract,
        ExtractSkill::ALL.into_iter().map(ExtractSkill::model_choice),
    );
    assert!(invalid.is_empty(), "extract skills missing from the deck: {invalid:?}");
}

#[test]
fn default_model_choice_each_category_expected_resolvable() {
    let deck = ModelDeck::builtin();
    for category in [ModelCategory::Llm, ModelCategory::ImgGen, ModelCategory::Extract] {
        let choice = default_model_choice(category);
        deck.resolve_choice(category, choice)
            .unwrap_or_else(|error| panic!("{choice}: {error}"));
    }
}

#[test]
fn llm_skill_serde_name_expected_kebab_case() {
    let value = serde_json::to_value(LlmSkill::EngineeringStructured).expect("skill serializes");
    assert_eq!(value, serde_json::json!("engineering-structured"));
}
