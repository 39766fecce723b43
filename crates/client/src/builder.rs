//! Fluent request builders.
//!
//! Pure data accumulators: no I/O happens until the terminal `send()` (or
//! `stream()`), which freezes the accumulated state into a canonical
//! immutable request and hands it to the façade.

use wh_domain::error::Result;
use wh_domain::message::Message;
use wh_domain::request::{
    AudioJob, AudioRequest, BaseRequest, EmbeddingsRequest, ImageRequest, StructuredMode,
    StructuredRequest, TextRequest,
};
use wh_domain::response::{
    AudioResponse, EmbeddingsResponse, ImageResponse, StructuredResponse, TextResponse,
};
use wh_domain::stream::ChunkStream;
use wh_domain::tool::{ToolChoice, ToolDefinition};

use crate::client::Client;

macro_rules! base_setters {
    () => {
        /// Select the provider handling this request.
        pub fn using(mut self, provider: impl Into<String>) -> Self {
            self.using = Some(provider.into());
            self
        }

        pub fn model(mut self, model: impl Into<String>) -> Self {
            self.base.model = model.into();
            self
        }

        pub fn temperature(mut self, temperature: f32) -> Self {
            self.base.temperature = Some(temperature);
            self
        }

        pub fn top_p(mut self, top_p: f32) -> Self {
            self.base.top_p = Some(top_p);
            self
        }

        pub fn max_tokens(mut self, max_tokens: u32) -> Self {
            self.base.max_tokens = Some(max_tokens);
            self
        }

        pub fn stop(mut self, sequence: impl Into<String>) -> Self {
            self.base.stop.push(sequence.into());
            self
        }

        pub fn seed(mut self, seed: u64) -> Self {
            self.base.seed = Some(seed);
            self
        }

        /// Provider-specific escape hatch, merged verbatim into the wire
        /// body.
        pub fn option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
            self.base.provider_options.insert(key.into(), value);
            self
        }
    };
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Text
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct TextBuilder<'a> {
    client: &'a Client,
    using: Option<String>,
    base: BaseRequest,
    messages: Vec<Message>,
    tools: Vec<ToolDefinition>,
    tool_choice: ToolChoice,
}

impl<'a> TextBuilder<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self {
            client,
            using: None,
            base: BaseRequest::default(),
            messages: Vec::new(),
            tools: Vec::new(),
            tool_choice: ToolChoice::default(),
        }
    }

    base_setters!();

    pub fn system(mut self, text: impl Into<String>) -> Self {
        self.messages.push(Message::system(text));
        self
    }

    pub fn user(mut self, text: impl Into<String>) -> Self {
        self.messages.push(Message::user(text));
        self
    }

    pub fn assistant(mut self, text: impl Into<String>) -> Self {
        self.messages.push(Message::assistant(text));
        self
    }

    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn messages(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.messages.extend(messages);
        self
    }

    pub fn tool(mut self, tool: ToolDefinition) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = choice;
        self
    }

    fn freeze(self) -> (Option<String>, TextRequest) {
        (
            self.using,
            TextRequest {
                base: self.base,
                messages: self.messages,
                tools: self.tools,
                tool_choice: self.tool_choice,
            },
        )
    }

    /// Send and wait for the full response.
    pub async fn send(self) -> Result<TextResponse> {
        let client = self.client;
        let (using, req) = self.freeze();
        client.send_text(using.as_deref(), req).await
    }

    /// Send and receive incremental chunks. The stream closes on
    /// completion or when dropped (cancellation).
    pub async fn stream(self) -> Result<ChunkStream> {
        let client = self.client;
        let (using, req) = self.freeze();
        client.send_stream(using.as_deref(), req).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Structured
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct StructuredBuilder<'a> {
    client: &'a Client,
    using: Option<String>,
    base: BaseRequest,
    messages: Vec<Message>,
    schema: serde_json::Value,
    schema_name: String,
    mode: StructuredMode,
}

impl<'a> StructuredBuilder<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self {
            client,
            using: None,
            base: BaseRequest::default(),
            messages: Vec::new(),
            schema: serde_json::json!({"type": "object"}),
            schema_name: "structured_output".into(),
            mode: StructuredMode::default(),
        }
    }

    base_setters!();

    pub fn system(mut self, text: impl Into<String>) -> Self {
        self.messages.push(Message::system(text));
        self
    }

    pub fn user(mut self, text: impl Into<String>) -> Self {
        self.messages.push(Message::user(text));
        self
    }

    /// The JSON Schema the response must conform to.
    pub fn schema(mut self, schema: serde_json::Value) -> Self {
        self.schema = schema;
        self
    }

    /// Name for the synthesized tool in `Tools` mode.
    pub fn schema_name(mut self, name: impl Into<String>) -> Self {
        self.schema_name = name.into();
        self
    }

    pub fn mode(mut self, mode: StructuredMode) -> Self {
        self.mode = mode;
        self
    }

    pub async fn send(self) -> Result<StructuredResponse> {
        let client = self.client;
        let using = self.using;
        let req = StructuredRequest {
            base: self.base,
            messages: self.messages,
            schema: self.schema,
            schema_name: self.schema_name,
            mode: self.mode,
        };
        client.send_structured(using.as_deref(), req).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Embeddings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct EmbeddingsBuilder<'a> {
    client: &'a Client,
    using: Option<String>,
    base: BaseRequest,
    input: Vec<String>,
    dimensions: Option<u32>,
}

impl<'a> EmbeddingsBuilder<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self {
            client,
            using: None,
            base: BaseRequest::default(),
            input: Vec::new(),
            dimensions: None,
        }
    }

    base_setters!();

    pub fn input<I, S>(mut self, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input.extend(texts.into_iter().map(Into::into));
        self
    }

    pub fn dimensions(mut self, dimensions: u32) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    pub async fn send(self) -> Result<EmbeddingsResponse> {
        let client = self.client;
        let using = self.using;
        let req = EmbeddingsRequest {
            base: self.base,
            input: self.input,
            dimensions: self.dimensions,
        };
        client.send_embeddings(using.as_deref(), req).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Audio
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct AudioBuilder<'a> {
    client: &'a Client,
    using: Option<String>,
    base: BaseRequest,
    job: Option<AudioJob>,
}

impl<'a> AudioBuilder<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self {
            client,
            using: None,
            base: BaseRequest::default(),
            job: None,
        }
    }

    base_setters!();

    /// Text-to-speech.
    pub fn speech(mut self, text: impl Into<String>) -> Self {
        self.job = Some(AudioJob::Speech {
            text: text.into(),
            voice: None,
            format: None,
        });
        self
    }

    pub fn voice(mut self, voice: impl Into<String>) -> Self {
        if let Some(AudioJob::Speech { voice: v, .. }) = &mut self.job {
            *v = Some(voice.into());
        }
        self
    }

    /// Speech-to-text on raw audio bytes; the filename drives content-type
    /// inference.
    pub fn transcribe(mut self, data: Vec<u8>, filename: impl Into<String>) -> Self {
        self.job = Some(AudioJob::Transcribe {
            data,
            filename: filename.into(),
            language: None,
        });
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        if let Some(AudioJob::Transcribe { language: l, .. }) = &mut self.job {
            *l = Some(language.into());
        }
        self
    }

    pub async fn send(self) -> Result<AudioResponse> {
        let client = self.client;
        let using = self.using;
        let job = self.job.ok_or_else(|| {
            wh_domain::Error::validation("audio request needs speech() or transcribe()")
        })?;
        let req = AudioRequest {
            base: self.base,
            job,
        };
        client.send_audio(using.as_deref(), req).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Image
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ImageBuilder<'a> {
    client: &'a Client,
    using: Option<String>,
    base: BaseRequest,
    prompt: String,
    size: Option<String>,
    quality: Option<String>,
    count: Option<u8>,
}

impl<'a> ImageBuilder<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self {
            client,
            using: None,
            base: BaseRequest::default(),
            prompt: String::new(),
            size: None,
            quality: None,
            count: None,
        }
    }

    base_setters!();

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn size(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }

    pub fn quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = Some(quality.into());
        self
    }

    pub fn count(mut self, count: u8) -> Self {
        self.count = Some(count);
        self
    }

    pub async fn send(self) -> Result<ImageResponse> {
        let client = self.client;
        let using = self.using;
        let req = ImageRequest {
            base: self.base,
            prompt: self.prompt,
            size: self.size,
            quality: self.quality,
            count: self.count,
        };
        client.send_image(using.as_deref(), req).await
    }
}
