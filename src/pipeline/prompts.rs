//! Category-aware prompt templates.
//!
//! One table drives both the classification prompt (definitions and
//! examples) and reply generation (tone and outgoing subject).

use crate::pipeline::types::{Category, Email};

/// Max body characters sent to the model.
const MAX_BODY_CHARS: usize = 4000;

/// Per-category prompt material.
#[derive(Debug)]
pub struct CategoryTemplate {
    pub category: Category,
    /// Definition shown to the classifier.
    pub definition: &'static str,
    /// One illustrative email for the classifier: (subject, body).
    pub example: (&'static str, &'static str),
    /// Tone instruction for the responder.
    pub tone: &'static str,
    /// Subject line of the outgoing reply.
    pub reply_subject: &'static str,
}

static TEMPLATES: [CategoryTemplate; 5] = [
    CategoryTemplate {
        category: Category::Complaint,
        definition: "expressing dissatisfaction, anger, or frustration with a product, service, or experience",
        example: (
            "Delayed order and poor packaging",
            "I'm extremely disappointed. My package arrived a week late and the box was crushed. I expect better.",
        ),
        tone: "apologetic: acknowledge the problem, apologise sincerely, and state what happens next",
        reply_subject: "Regarding Your Complaint",
    },
    CategoryTemplate {
        category: Category::Inquiry,
        definition: "requesting specific information or asking a question about a product, service, or policy",
        example: (
            "Clarification on billing cycle",
            "Hi, could you explain how often I'm billed for the premium subscription? Monthly or yearly?",
        ),
        tone: "informative: answer clearly and point to where more detail can be found",
        reply_subject: "Regarding Your Inquiry",
    },
    CategoryTemplate {
        category: Category::Feedback,
        definition: "offering praise, general impressions, or constructive criticism without a request",
        example: (
            "Great experience with your chat support",
            "Just wanted to say your support rep was amazing. Fast, friendly, and fixed everything!",
        ),
        tone: "appreciative: thank the customer warmly for taking the time to share",
        reply_subject: "Regarding Your Feedback",
    },
    CategoryTemplate {
        category: Category::SupportRequest,
        definition: "seeking help with a technical issue, error, or usage problem",
        example: (
            "Can't reset my password",
            "I tried resetting my password but I'm not receiving any reset email. Can you help?",
        ),
        tone: "action-oriented: confirm the issue is being worked on and give concrete next steps",
        reply_subject: "Regarding Your Support Request",
    },
    CategoryTemplate {
        category: Category::Other,
        definition: "everything else that does not fit the above, including proposals, marketing, etc.",
        example: (
            "Collaboration proposal",
            "We'd love to discuss a strategic partnership with your company. Is next week good for a meeting?",
        ),
        tone: "neutral: acknowledge receipt politely without committing to specifics",
        reply_subject: "Regarding Your Message",
    },
];

/// Template for a category.
pub fn template(category: Category) -> &'static CategoryTemplate {
    TEMPLATES
        .iter()
        .find(|t| t.category == category)
        .unwrap_or(&TEMPLATES[4])
}

/// System prompt for zero-shot classification.
pub fn classification_system_prompt() -> String {
    let mut prompt = String::with_capacity(2048);
    prompt.push_str(
        "You are a smart and reliable assistant tasked with classifying customer emails \
         into exactly one of five categories:\n",
    );
    for t in &TEMPLATES {
        prompt.push_str(&format!("- {}: {}.\n", t.category.label(), t.definition));
    }
    prompt.push_str(
        "\nUse only the content of the email to determine its intent. Tone and language are important.\n\n\
         Examples:\n",
    );
    for t in &TEMPLATES {
        prompt.push_str(&format!(
            "---\nSubject: {}\nBody: {}\nOutput: {{\"category\": \"{}\"}}\n",
            t.example.0,
            t.example.1,
            t.category.label()
        ));
    }
    prompt.push_str(
        "---\n\nRespond only with a JSON object of the form:\n\
         {\"category\": \"<complaint|inquiry|feedback|support_request|other>\"}",
    );
    prompt
}

/// User prompt carrying the email to classify.
pub fn classification_user_prompt(email: &Email) -> String {
    format!(
        "Now classify the following email.\n\nSubject: {}\nBody: {}",
        email.subject,
        truncate(&email.body)
    )
}

/// System prompt for reply generation, with the category's tone.
pub fn response_system_prompt(category: Category) -> String {
    let t = template(category);
    format!(
        "You are a professional customer service assistant. Write a short, polite reply \
         to a customer email.\n\n\
         Classification: {label}\n\
         Tone: {tone}\n\n\
         Guidelines:\n\
         - Keep the tone friendly and professional\n\
         - Address the customer's concern based on the classification\n\
         - Reply directly to the customer (no AI disclaimers)\n\
         - Keep it under 4 sentences\n\
         - Do not repeat the original message\n\
         - End with a polite closing signed \"Customer Service Team\"\n\
         - Use proper grammar, spelling, and punctuation\n\n\
         Only output the message body as plain text.",
        label = category.label(),
        tone = t.tone,
    )
}

/// User prompt carrying the email to answer.
pub fn response_user_prompt(email: &Email) -> String {
    format!(
        "Email content:\nFrom: {}\nSubject: {}\nBody: {}",
        email.sender,
        email.subject,
        truncate(&email.body)
    )
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_BODY_CHARS).collect()
}
