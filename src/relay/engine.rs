//! Relay engine - one request/response cycle per incoming update.
//!
//! Each handler locks its chat's log for the whole cycle, so updates within a
//! chat are applied in arrival order while other chats run concurrently. A
//! failed exchange never records turns; the user gets exactly one error
//! notice instead.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{error, info, warn};

use crate::error::RelayError;
use crate::relay::gemini::{CompletionClient, ImagePayload};
use crate::relay::history::{ChatLog, ConversationStore, Turn};
use crate::relay::split::split_reply;
use crate::relay::telegram::ChatTransport;

const WELCOME_TEXT: &str = "\
🎓 Welcome to Limlo Study Bot!

Your personal AI study companion for Ahmadu Bello University students! 🦅

I'm here to help you excel in your studies. You can:
• Ask me any question about any subject
• Request explanations of complex topics
• Get help with assignments (I'll guide you, not just give answers!)
• Practice with quizzes and problems
• Study for exams
• 📸 Send images of diagrams, equations, or notes for analysis!

Commands:
/start - Show this welcome message
/clear - Clear conversation history
/help - Get help on how to use me

Just send me your question or image and I'll do my best to help! 📚

Go ABU Great Ife! 💚🤍";

const HELP_TEXT: &str = "\
📖 How to use Limlo Study Bot:

1️⃣ Ask questions naturally:
   \"What is photosynthesis?\"
   \"Explain Newton's laws of motion\"

2️⃣ Request step-by-step solutions:
   \"How do I solve quadratic equations?\"
   \"Walk me through mitosis\"

3️⃣ Get study tips:
   \"How can I memorize the periodic table?\"

4️⃣ Practice problems:
   \"Give me a practice problem on algebra\"

5️⃣ 📸 Send images:
   • Mathematical equations
   • Diagrams and charts
   • Handwritten notes
   • Textbook pages
   • Lab results

   Add a caption with your question about the image!

💡 Tips:
• Be specific with your questions
• I remember our conversation, so you can ask follow-up questions
• Use /clear to start a new topic
• For images, add a caption describing what you need help with

Happy studying, ABU student! 🦅📚✨

Go Great Ife! 💚🤍";

const CLEAR_TEXT: &str = "✅ Conversation history cleared! Starting fresh.";

const TEXT_SYSTEM_PROMPT: &str = "\
You are Limlo Study Bot, a helpful AI study assistant created specifically for \
Ahmadu Bello University (ABU) students. Your role is to:
- Explain concepts clearly and thoroughly but concisely
- Break down complex topics into understandable parts
- Provide examples and analogies relevant to ABU students when possible
- Guide students to understand, not just give direct answers
- Encourage critical thinking and academic excellence
- Be patient, supportive, and encouraging
- Keep responses under 3000 characters when possible for better readability

When helping with assignments, guide the student through the problem rather \
than just providing the answer.";

const IMAGE_SYSTEM_PROMPT: &str = "\
You are Limlo Study Bot, analyzing an image for an Ahmadu Bello University \
student. When analyzing images:
- Identify what the image contains (diagram, equation, notes, chart, etc.)
- Explain key concepts shown in the image
- If it's a problem, guide the student through solving it
- If it's notes or text, help clarify difficult concepts
- Point out important details the student should notice
- Be thorough but concise (under 3000 characters when possible)
- Always maintain an encouraging, educational tone

Help the student understand and learn from what they've shared!";

const DEFAULT_IMAGE_CAPTION: &str =
    "What can you tell me about this image? Please analyze it in detail.";

const TEXT_ERROR_TEXT: &str = "\
😔 Sorry, I encountered an error processing your question.

Please try:
• Rephrasing your question
• Using /clear to start fresh
• Asking a different question";

const IMAGE_ERROR_TEXT: &str = "\
😔 Sorry, I encountered an error analyzing your image.

Please try:
• Sending a clearer image
• Adding a caption describing what you need help with
• Making sure the image is not too large";

const MEDIA_HINT_TEXT: &str = "\
😔 I couldn't read that image. Please send a photo in JPEG, PNG or WebP \
format, with a caption describing what you need help with.";

const THINKING_LINES: &[&str] = &[
    "🤔 Thinking...",
    "💭 Let me think about that...",
    "🧠 Processing your question...",
    "📚 Looking into this...",
    "🔍 Analyzing...",
];

const ANALYZING_LINES: &[&str] = &[
    "📸 Analyzing your image...",
    "🔍 Examining the image...",
    "👀 Looking at your image...",
    "🧠 Processing the image...",
    "📊 Analyzing the diagram...",
];

/// Prefix on every chunk after the first of a split reply.
const CONTINUATION_PREFIX: &str = "(continued...)\n\n";

/// Sniff the raster format from magic bytes. Only formats the completion
/// endpoint accepts are forwarded.
pub fn detect_image_format(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("image/png");
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    None
}

/// The message relay.
pub struct RelayEngine {
    store: ConversationStore,
    completion: Arc<dyn CompletionClient>,
    transport: Arc<dyn ChatTransport>,
    chunk_limit: usize,
    /// Rotates through the status lines.
    indicator_seq: AtomicUsize,
}

impl RelayEngine {
    pub fn new(
        history_cap: usize,
        chunk_limit: usize,
        completion: Arc<dyn CompletionClient>,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        Self {
            store: ConversationStore::new(history_cap),
            completion,
            transport,
            chunk_limit,
            indicator_seq: AtomicUsize::new(0),
        }
    }

    /// `/start` - welcome text; also makes sure the chat's log exists.
    pub async fn handle_start(&self, chat_id: i64) -> Result<(), RelayError> {
        info!("👋 Chat {chat_id} started the bot");
        self.store.chat(chat_id).await;
        self.transport.send_text(chat_id, WELCOME_TEXT).await?;
        Ok(())
    }

    /// `/help` - usage text. No state change.
    pub async fn handle_help(&self, chat_id: i64) -> Result<(), RelayError> {
        self.transport.send_text(chat_id, HELP_TEXT).await?;
        Ok(())
    }

    /// `/clear` - empty the chat's history. Idempotent.
    pub async fn handle_clear(&self, chat_id: i64) -> Result<(), RelayError> {
        {
            let chat = self.store.chat(chat_id).await;
            chat.lock().await.clear();
        }
        info!("🧹 Chat {chat_id} cleared conversation history");
        self.transport.send_text(chat_id, CLEAR_TEXT).await?;
        Ok(())
    }

    /// A plain text message: history + new turn → Gemini → chunked reply.
    pub async fn handle_text(&self, chat_id: i64, text: &str) -> Result<(), RelayError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        let preview: String = text.chars().take(50).collect();
        info!("💬 Chat {chat_id}: \"{preview}\"");

        let chat = self.store.chat(chat_id).await;
        let mut log = chat.lock().await;

        let mut prompt_turns = log.snapshot();
        prompt_turns.push(Turn::user(text));

        self.run_exchange(
            chat_id,
            &mut log,
            TEXT_SYSTEM_PROMPT,
            prompt_turns,
            None,
            text.to_string(),
            THINKING_LINES,
            TEXT_ERROR_TEXT,
        )
        .await
    }

    /// A photo message: validate the bytes, then relay with the image
    /// attached. Unsupported payloads never reach the completion call.
    pub async fn handle_photo(
        &self,
        chat_id: i64,
        image_bytes: Vec<u8>,
        caption: Option<&str>,
    ) -> Result<(), RelayError> {
        let Some(mime_type) = detect_image_format(&image_bytes) else {
            let err = RelayError::Media(format!("unrecognized format ({} bytes)", image_bytes.len()));
            warn!("🖼️ Chat {chat_id}: {err}");
            self.transport.send_text(chat_id, MEDIA_HINT_TEXT).await?;
            return Ok(());
        };

        let caption = match caption.map(str::trim) {
            Some(c) if !c.is_empty() => c,
            _ => DEFAULT_IMAGE_CAPTION,
        };

        info!(
            "🖼️ Chat {chat_id}: photo ({} bytes, {mime_type}), caption: \"{}\"",
            image_bytes.len(),
            caption.chars().take(50).collect::<String>()
        );

        let image = ImagePayload {
            bytes: image_bytes,
            mime_type,
        };

        let chat = self.store.chat(chat_id).await;
        let mut log = chat.lock().await;

        let mut prompt_turns = log.snapshot();
        prompt_turns.push(Turn::user(caption));

        self.run_exchange(
            chat_id,
            &mut log,
            IMAGE_SYSTEM_PROMPT,
            prompt_turns,
            Some(&image),
            format!("[Sent image] {caption}"),
            ANALYZING_LINES,
            IMAGE_ERROR_TEXT,
        )
        .await
    }

    /// Call the completion endpoint and deliver the reply. Both turns are
    /// recorded only after every chunk was sent; any failure leaves the log
    /// untouched and produces a single error notice.
    #[allow(clippy::too_many_arguments)]
    async fn run_exchange(
        &self,
        chat_id: i64,
        log: &mut ChatLog,
        system: &str,
        prompt_turns: Vec<Turn>,
        image: Option<&ImagePayload>,
        stored_user_turn: String,
        indicator_lines: &[&str],
        error_text: &str,
    ) -> Result<(), RelayError> {
        let indicator = self.send_indicator(chat_id, indicator_lines).await;

        let result = self.completion.complete(system, &prompt_turns, image).await;

        // Cosmetic only; a failure here must not fail the exchange.
        if let Some(message_id) = indicator {
            self.transport.delete_message(chat_id, message_id).await.ok();
        }

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                error!("Completion failed for chat {chat_id}: {e}");
                self.transport.send_text(chat_id, error_text).await.ok();
                return Ok(());
            }
        };

        for (i, chunk) in split_reply(&reply, self.chunk_limit).iter().enumerate() {
            let outgoing = if i == 0 {
                chunk.clone()
            } else {
                format!("{CONTINUATION_PREFIX}{chunk}")
            };
            if let Err(e) = self.transport.send_text(chat_id, &outgoing).await {
                error!("Delivery failed for chat {chat_id}: {e}");
                self.transport.send_text(chat_id, error_text).await.ok();
                return Ok(());
            }
        }

        log.push(Turn::user(stored_user_turn));
        log.push(Turn::assistant(reply));
        info!("✅ Replied to chat {chat_id} ({} stored turns)", log.len());
        Ok(())
    }

    async fn send_indicator(&self, chat_id: i64, lines: &[&str]) -> Option<i64> {
        let line = lines[self.indicator_seq.fetch_add(1, Ordering::Relaxed) % lines.len()];
        self.transport.send_text(chat_id, line).await.ok()
    }

    #[cfg(test)]
    pub(crate) async fn history(&self, chat_id: i64) -> Vec<Turn> {
        self.store.chat(chat_id).await.lock().await.snapshot()
    }
}
