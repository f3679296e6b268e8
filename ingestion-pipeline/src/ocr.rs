use std::sync::Arc;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ImageDetail, ImageUrlArgs,
    },
    Client,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};

use common::error::AppError;

use crate::pdf::PageImage;

const OCR_PROMPT: &str = "Transcribe all text visible in this image, preserving the reading order. \
Respond with the transcribed text only. If the image contains no legible text, respond with an empty message.";
const OCR_MAX_TOKENS: u32 = 4096;

/// Per-image text recognition. A trait seam so the pipeline can run against
/// a stub in tests; the production engine sends the image to a multimodal
/// chat model.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image: &PageImage) -> Result<String, AppError>;
}

pub struct VisionOcr {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
}

impl VisionOcr {
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl OcrEngine for VisionOcr {
    async fn recognize(&self, image: &PageImage) -> Result<String, AppError> {
        let encoded = STANDARD.encode(&image.bytes);
        let image_url = format!("data:{};base64,{encoded}", image.mime);

        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.clone())
            .max_tokens(OCR_MAX_TOKENS)
            .messages([ChatCompletionRequestUserMessageArgs::default()
                .content(vec![
                    ChatCompletionRequestMessageContentPartTextArgs::default()
                        .text(OCR_PROMPT)
                        .build()?
                        .into(),
                    ChatCompletionRequestMessageContentPartImageArgs::default()
                        .image_url(
                            ImageUrlArgs::default()
                                .url(image_url)
                                .detail(ImageDetail::High)
                                .build()?,
                        )
                        .build()?
                        .into(),
                ])
                .build()?
                .into()])
            .build()?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|err| AppError::Ocr(format!("vision request failed: {err}")))?;

        let text = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_ref())
            .map(|content| content.trim().to_owned())
            .unwrap_or_default();

        Ok(text)
    }
}
