//! Contributors bundled with the application

use std::collections::BTreeMap;

use crate::plugins::{
    AuthSchema, Capabilities, FieldKind, FlowKind, HookResult, RequestContributor, SchemaField,
};

/// Sends `XDEBUG_SESSION=start` so PHP backends attach the debugger
pub struct XdebugCookies;

impl RequestContributor for XdebugCookies {
    fn name(&self) -> &str {
        "xdebug"
    }

    fn description(&self) -> Option<&str> {
        Some("Starts an Xdebug session on every request")
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            headers: false,
            cookies: true,
        }
    }

    fn cookies(&self) -> HookResult {
        Ok(Some(BTreeMap::from([(
            "XDEBUG_SESSION".to_string(),
            "start".to_string(),
        )])))
    }
}

/// Adds the `login` auth type: username/password exchanged for a token
pub struct LoginAuth;

impl RequestContributor for LoginAuth {
    fn name(&self) -> &str {
        "loginauth"
    }

    fn description(&self) -> Option<&str> {
        Some("Login form auth type")
    }

    fn auth_schema(&self) -> Option<AuthSchema> {
        Some(AuthSchema {
            type_tag: "login".to_string(),
            description: "Log in with username and password, then send the returned token"
                .to_string(),
            flow: FlowKind::Login,
            fields: vec![
                SchemaField::required("url", FieldKind::String),
                SchemaField::optional("token_path", FieldKind::String),
                SchemaField::optional("headers", FieldKind::StringList),
            ],
        })
    }
}
