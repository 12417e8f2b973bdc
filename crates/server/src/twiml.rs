//! Voice markup rendering
//!
//! Builds the `Response` document returned to the carrier on every webhook.
//! Text and attribute values are escaped by the XML writer.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use outreach_config::TelephonyConfig;

use crate::ServerError;

/// Collects speech or keypad input and posts it to `action`
#[derive(Debug, Clone, PartialEq)]
pub struct Gather {
    pub action: String,
    pub input: String,
    pub timeout_secs: u32,
    pub speech_timeout: String,
    pub language: String,
    /// Post to `action` even when nothing was heard
    pub action_on_empty_result: bool,
    /// Lines spoken while listening
    pub says: Vec<String>,
}

impl Gather {
    pub fn new(action: impl Into<String>, telephony: &TelephonyConfig) -> Self {
        Self {
            action: action.into(),
            input: "speech dtmf".to_string(),
            timeout_secs: telephony.gather_timeout_secs,
            speech_timeout: telephony.speech_timeout.clone(),
            language: telephony.language.clone(),
            action_on_empty_result: true,
            says: Vec::new(),
        }
    }

    pub fn say(mut self, text: impl Into<String>) -> Self {
        self.says.push(text.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Verb {
    Say(String),
    Gather(Gather),
    Record { action: String, max_length_secs: u32 },
    Hangup,
}

/// A voice response document
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceResponse {
    voice: String,
    language: String,
    verbs: Vec<Verb>,
}

impl VoiceResponse {
    pub fn new(telephony: &TelephonyConfig) -> Self {
        Self {
            voice: telephony.voice.clone(),
            language: telephony.language.clone(),
            verbs: Vec::new(),
        }
    }

    pub fn say(mut self, text: impl Into<String>) -> Self {
        self.verbs.push(Verb::Say(text.into()));
        self
    }

    pub fn gather(mut self, gather: Gather) -> Self {
        self.verbs.push(Verb::Gather(gather));
        self
    }

    pub fn record(mut self, action: impl Into<String>, max_length_secs: u32) -> Self {
        self.verbs.push(Verb::Record {
            action: action.into(),
            max_length_secs,
        });
        self
    }

    pub fn hangup(mut self) -> Self {
        self.verbs.push(Verb::Hangup);
        self
    }

    /// Whether the carrier hangs up after this document
    pub fn ends_call(&self) -> bool {
        self.verbs.iter().any(|v| matches!(v, Verb::Hangup))
    }

    /// Serialize to an XML document
    pub fn render(&self) -> Result<String, ServerError> {
        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Start(BytesStart::new("Response")))?;

        for verb in &self.verbs {
            match verb {
                Verb::Say(text) => self.write_say(&mut writer, text)?,
                Verb::Gather(gather) => {
                    let timeout = gather.timeout_secs.to_string();
                    let mut start = BytesStart::new("Gather");
                    start.push_attribute(("input", gather.input.as_str()));
                    start.push_attribute(("action", gather.action.as_str()));
                    start.push_attribute(("method", "POST"));
                    start.push_attribute(("timeout", timeout.as_str()));
                    start.push_attribute(("speechTimeout", gather.speech_timeout.as_str()));
                    start.push_attribute(("language", gather.language.as_str()));
                    start.push_attribute((
                        "actionOnEmptyResult",
                        if gather.action_on_empty_result { "true" } else { "false" },
                    ));
                    writer.write_event(Event::Start(start))?;
                    for text in &gather.says {
                        self.write_say(&mut writer, text)?;
                    }
                    writer.write_event(Event::End(BytesEnd::new("Gather")))?;
                }
                Verb::Record {
                    action,
                    max_length_secs,
                } => {
                    let max_length = max_length_secs.to_string();
                    let mut record = BytesStart::new("Record");
                    record.push_attribute(("recordingStatusCallback", action.as_str()));
                    record.push_attribute(("maxLength", max_length.as_str()));
                    record.push_attribute(("playBeep", "false"));
                    writer.write_event(Event::Empty(record))?;
                }
                Verb::Hangup => {
                    writer.write_event(Event::Empty(BytesStart::new("Hangup")))?;
                }
            }
        }

        writer.write_event(Event::End(BytesEnd::new("Response")))?;
        String::from_utf8(writer.into_inner()).map_err(|e| ServerError::Render(e.to_string()))
    }

    fn write_say(&self, writer: &mut Writer<Vec<u8>>, text: &str) -> Result<(), ServerError> {
        let mut say = BytesStart::new("Say");
        say.push_attribute(("voice", self.voice.as_str()));
        say.push_attribute(("language", self.language.as_str()));
        writer.write_event(Event::Start(say))?;
        writer.write_event(Event::Text(BytesText::new(text)))?;
        writer.write_event(Event::End(BytesEnd::new("Say")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_say_and_hangup() {
        let xml = VoiceResponse::new(&TelephonyConfig::default())
            .say("Thanks for your time.")
            .hangup()
            .render()
            .unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<Say voice=\"Polly.Joanna\" language=\"en-US\">Thanks for your time.</Say>"));
        assert!(xml.contains("<Hangup/>"));
        assert!(xml.ends_with("</Response>"));
    }

    #[test]
    fn test_gather_attributes_and_nesting() {
        let telephony = TelephonyConfig::default();
        let xml = VoiceResponse::new(&telephony)
            .gather(Gather::new("/voice?leadId=L1&retryCount=0", &telephony).say("Hi Sam"))
            .render()
            .unwrap();

        assert!(xml.contains("input=\"speech dtmf\""));
        assert!(xml.contains("action=\"/voice?leadId=L1&amp;retryCount=0\""));
        assert!(xml.contains("actionOnEmptyResult=\"true\""));
        assert!(xml.contains("timeout=\"5\""));
        let gather_at = xml.find("<Gather").unwrap();
        let say_at = xml.find("<Say").unwrap();
        assert!(gather_at < say_at);
        assert!(xml.contains("</Gather>"));
    }

    #[test]
    fn test_text_is_escaped() {
        let xml = VoiceResponse::new(&TelephonyConfig::default())
            .say("Plans < $50 & \"flexible\"")
            .render()
            .unwrap();
        assert!(xml.contains("Plans &lt; $50 &amp;"));
        assert!(!xml.contains("< $50"));
    }

    #[test]
    fn test_record_and_ends_call() {
        let telephony = TelephonyConfig::default();
        let response = VoiceResponse::new(&telephony)
            .record("/voice/recording", 3600)
            .gather(Gather::new("/voice", &telephony).say("Hi Sam"));
        assert!(!response.ends_call());

        let xml = response.render().unwrap();
        assert!(xml.contains("<Record recordingStatusCallback=\"/voice/recording\" maxLength=\"3600\""));
        assert!(xml.find("<Record").unwrap() < xml.find("<Gather").unwrap());

        assert!(VoiceResponse::new(&telephony).say("Goodbye.").hangup().ends_call());
    }
}
