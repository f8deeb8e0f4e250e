//! Notification → message text and spoken sentence.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::warn;

use schoolbell_core::{
    config::DeliveryConfig, AutoStopReason, ChannelId, Mode, Notification, TenantId,
};

use crate::types::{MessageFormat, OutboundMessage, VoiceCue};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Language {
    #[default]
    En,
    Ko,
}

impl Language {
    /// Parse a config value, falling back to English for unknown tags.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "en" | "en-us" | "en-gb" => Language::En,
            "ko" | "ko-kr" => Language::Ko,
            other => {
                warn!(language = other, "unknown delivery language, using English");
                Language::En
            }
        }
    }
}

/// What the delivery task has to do for one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Text(OutboundMessage),
    Voice(VoiceCue),
    Release(TenantId),
}

#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    tz: Tz,
    language: Language,
}

impl Renderer {
    pub fn new(tz: Tz, language: Language) -> Self {
        Self { tz, language }
    }

    pub fn from_config(tz: Tz, config: &DeliveryConfig) -> Self {
        Self::new(tz, Language::from_tag(&config.language))
    }

    /// Text messages first, then the voice cue, so chat users see the change
    /// even when audio is slow or unavailable.
    pub fn render(&self, event: &Notification) -> Vec<Delivery> {
        let tenant = event.tenant();
        let mut out = Vec::new();
        match event {
            Notification::PhaseChanged {
                timer,
                mode,
                channel,
                voice,
                ..
            } => {
                out.push(self.text(tenant, *channel, self.phase_text(timer, *mode)));
                self.push_cue(&mut out, tenant, *voice, self.phase_sentence(timer, *mode));
            }
            Notification::BreakStarted {
                label,
                duration_secs,
                ends_at,
                extending,
                channels,
                voice,
                ..
            } => {
                let text = self.break_text(label, *duration_secs, *ends_at, *extending);
                for channel in channels {
                    out.push(self.text(tenant, *channel, text.clone()));
                }
                if !extending {
                    self.push_cue(&mut out, tenant, *voice, self.break_sentence(label));
                }
            }
            Notification::Resumed {
                channels, voice, ..
            } => {
                let text = self.resume_text();
                for channel in channels {
                    out.push(self.text(tenant, *channel, text.to_string()));
                }
                self.push_cue(&mut out, tenant, *voice, self.resume_sentence().to_string());
            }
            Notification::AutoStopped {
                timer,
                reason,
                channel,
                ..
            } => {
                out.push(self.text(tenant, *channel, self.auto_stop_text(timer, *reason)));
            }
            Notification::ReleaseLink { .. } => out.push(Delivery::Release(tenant)),
        }
        out
    }

    fn text(&self, tenant: TenantId, channel: ChannelId, content: String) -> Delivery {
        Delivery::Text(OutboundMessage {
            tenant,
            channel,
            content,
            format: MessageFormat::Markdown,
        })
    }

    fn push_cue(
        &self,
        out: &mut Vec<Delivery>,
        tenant: TenantId,
        voice: Option<ChannelId>,
        sentence: String,
    ) {
        if let Some(channel) = voice {
            out.push(Delivery::Voice(VoiceCue {
                tenant,
                channel,
                sentence,
            }));
        }
    }

    fn clock(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.tz).format("%H:%M:%S").to_string()
    }

    fn phase_text(&self, timer: &str, mode: Mode) -> String {
        match (self.language, mode) {
            (Language::En, Mode::Active) => format!("🔔 Bell! **{timer}** back to focus"),
            (Language::En, Mode::Rest) => format!("🔔 Bell! **{timer}** time to rest"),
            (Language::Ko, Mode::Active) => format!("🔔 학교종! **{timer}** 공부"),
            (Language::Ko, Mode::Rest) => format!("🔔 학교종! **{timer}** 휴식"),
        }
    }

    fn phase_sentence(&self, timer: &str, mode: Mode) -> String {
        match (self.language, mode) {
            (Language::En, Mode::Active) => format!("{timer}, focus time"),
            (Language::En, Mode::Rest) => format!("{timer}, rest time"),
            (Language::Ko, Mode::Active) => format!("{timer} 공부 시작"),
            (Language::Ko, Mode::Rest) => format!("{timer} 휴식 시작"),
        }
    }

    fn break_text(
        &self,
        label: &str,
        duration_secs: u64,
        ends_at: DateTime<Utc>,
        extending: bool,
    ) -> String {
        let end = self.clock(ends_at);
        let minutes = duration_secs / 60;
        match (self.language, extending) {
            (Language::En, false) => {
                format!("⏸️ **{label}** break! Everyone paused for {minutes}m (resumes {end})")
            }
            (Language::En, true) => format!("⏸️ **{label}**: pause extended until {end}"),
            (Language::Ko, false) => {
                format!("⏸️ **{label}** 쉬는시간! {minutes}분 일시정지 (→ {end} 재개)")
            }
            (Language::Ko, true) => format!("⏸️ **{label}** 일시정지 연장 → {end}까지"),
        }
    }

    fn break_sentence(&self, label: &str) -> String {
        match self.language {
            Language::En => format!("{label} break. Everyone pause"),
            Language::Ko => format!("{label} 쉬는시간 시작. 모두 일시정지"),
        }
    }

    fn resume_text(&self) -> &'static str {
        match self.language {
            Language::En => "▶️ Break over! All timers resumed",
            Language::Ko => "▶️ 쉬는시간 종료! 모든 타이머 재개",
        }
    }

    fn resume_sentence(&self) -> &'static str {
        match self.language {
            Language::En => "Break over. Everyone resume",
            Language::Ko => "쉬는시간 종료. 모두 재개",
        }
    }

    fn auto_stop_text(&self, timer: &str, reason: AutoStopReason) -> String {
        match (self.language, reason) {
            (Language::En, AutoStopReason::Cycles { completed }) => {
                format!("⏹️ **{timer}** finished after {completed} cycles")
            }
            (Language::En, AutoStopReason::Deadline) => {
                format!("⏹️ **{timer}** reached its end time")
            }
            (Language::Ko, AutoStopReason::Cycles { completed }) => {
                format!("⏹️ **{timer}** {completed}회 완료, 타이머 종료")
            }
            (Language::Ko, AutoStopReason::Deadline) => {
                format!("⏹️ **{timer}** 종료 시각 도달, 타이머 종료")
            }
        }
    }
}
