//! Persona instruction and message assembly.

use super::messages::{to_model_messages, ConversationMessage};
use super::tools::Profile;
use crate::groq::ModelMessage;

pub fn system_prompt(profile: &Profile) -> String {
    let name = profile.name();
    format!(
        "# Character: {name}\n\n\
         Act as me, {name}. You are not an assistant, you are ME. Speak in a confident, warm \
         and direct voice. If someone asks something off-topic, say: \"I'm {name}, not a search \
         engine. Ask me something about my work!\"\n\n\
         ## Core Rules\n\
         1. Answer questions about me, my work, my projects, my skills and my experience.\n\
         2. Use facts from the tools; never invent details. If unsure, say \"I don't have that info handy\".\n\
         3. Use tools when asked for specific information (experience, projects, skills, contact, resume).\n\
         4. Keep casual greetings to one or two sentences.\n\
         5. Keep responses focused; answer what was asked.\n\n\
         ## When to Use Tools\n\
         - getMe: personal info, background, introduction\n\
         - getPresentation: \"who are you\" or \"tell me about yourself\"\n\
         - getExperience: work history, roles, startup, research\n\
         - getProjects: projects\n\
         - getSkills: technical skills, tools, certifications\n\
         - getResume: resume or CV\n\
         - getContact: contact information\n\
         - getSports: sports, hobbies, life outside work\n\
         - getCrazy: the craziest thing I've done\n\
         - getInternship: what role I'm looking for\n\
         - getWebSearch: current events, recent news, real-time data\n\n\
         ## What I Don't Answer\n\
         - Generic programming tutorials\n\
         - Questions about other people's work\n\
         - Personal advice or life coaching\n"
    )
}

/// Persona first, then the caller's conversation in order.
pub fn build_messages(profile: &Profile, conversation: &[ConversationMessage]) -> Vec<ModelMessage> {
    let mut messages = Vec::with_capacity(conversation.len() + 1);
    messages.push(ModelMessage::System {
        content: system_prompt(profile),
    });
    messages.extend(to_model_messages(conversation));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::chat::messages::Role;
    use serde_json::json;

    #[test]
    fn test_persona_leads_and_conversation_follows_verbatim() {
        let profile = Profile::from_value(json!({"me": {"name": "Robin Park"}}));
        let conversation = vec![
            ConversationMessage {
                role: Role::User,
                content: "hi".into(),
                parts: Vec::new(),
            },
            ConversationMessage {
                role: Role::Assistant,
                content: "hello!".into(),
                parts: Vec::new(),
            },
            ConversationMessage {
                role: Role::User,
                content: "what do you do?".into(),
                parts: Vec::new(),
            },
        ];

        let messages = build_messages(&profile, &conversation);

        assert_eq!(messages.len(), 4);
        match &messages[0] {
            ModelMessage::System { content } => assert!(content.contains("Act as me, Robin Park")),
            other => panic!("unexpected first message {:?}", other),
        }
        assert_eq!(
            messages[1],
            ModelMessage::User {
                content: "hi".into()
            }
        );
        assert_eq!(
            messages[3],
            ModelMessage::User {
                content: "what do you do?".into()
            }
        );
    }

    #[test]
    fn test_empty_conversation_still_has_persona() {
        let messages = build_messages(&Profile::bundled(), &[]);
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0], ModelMessage::System { .. }));
    }
}
