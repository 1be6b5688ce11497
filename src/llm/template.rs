//! Canned lines for the counterpart seat and for running without a model.

use super::*;

const CITIZEN_STATEMENTS: &[&str] = &[
    "Honestly, it shows up in just about every conversation about {category}. Most of us run into it more often than we admit.",
    "If you said it out loud, nobody around here would need a second guess. It's pretty typical for {category}.",
    "I'd know it anywhere. Size doesn't really matter, it's the shape people remember.",
];

const LIAR_STATEMENTS: &[&str] = &[
    "For me it's something I can't really do without. Lately though, people seem to see it differently.",
    "I think everyone has their own picture of it. Mine is a pretty ordinary one.",
    "It comes up a lot in {category}, and I have a soft spot for it.",
];

const CITIZEN_REPLIES: &[&str] = &[
    "({sender}) I agree with that. You get it better once you talk it through.",
    "({sender}) That fits. Anyone who really knows it would say the same.",
    "({sender}) Hmm, close enough. I'd have described it a little differently, though.",
];

const LIAR_REPLIES: &[&str] = &[
    "({sender}) What exactly did you mean by that? Could you be a bit more specific?",
    "({sender}) Interesting. That sounds a bit vague to me, to be honest.",
    "({sender}) Right, that's more or less what I was thinking too.",
];

/// Deterministic, role-appropriate line for a seat. Never contains the real
/// keyword, so it is safe for both citizens and the liar.
pub fn scripted_line(ctx: &SpeechContext) -> String {
    let pool = match (ctx.phase.is_statement(), ctx.is_liar) {
        (true, false) => CITIZEN_STATEMENTS,
        (true, true) => LIAR_STATEMENTS,
        (false, false) => CITIZEN_REPLIES,
        (false, true) => LIAR_REPLIES,
    };

    let seed = ctx
        .speaker
        .bytes()
        .fold(ctx.phase as usize, |acc, b| acc.wrapping_add(b as usize));

    pool[seed % pool.len()]
        .replace("{category}", &ctx.category.to_lowercase())
        .replace("{sender}", &ctx.trigger_sender)
}

/// Provider that answers from the canned lines without any network call
pub struct TemplateProvider;

#[async_trait]
impl LlmProvider for TemplateProvider {
    async fn generate(&self, request: GenerateRequest) -> LlmResult<GenerateResponse> {
        Ok(GenerateResponse {
            text: scripted_line(&request.context),
            metadata: ResponseMetadata {
                provider: "template".to_string(),
                model: "scripted".to_string(),
                tokens_used: None,
                latency_ms: 0,
            },
        })
    }

    fn name(&self) -> &str {
        "template"
    }
}
