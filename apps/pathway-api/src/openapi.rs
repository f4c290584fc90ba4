use serde_json::{Value, json};

fn error_response(description: &str) -> Value {
    json!({
        "description": description,
        "content": {
            "application/json": {
                "schema": { "$ref": "#/components/schemas/Error" },
            },
        },
    })
}

fn json_response(description: &str, schema: Value) -> Value {
    json!({
        "description": description,
        "content": { "application/json": { "schema": schema } },
    })
}

pub fn openapi_spec() -> Value {
    json!({
        "openapi": "3.1.0",
        "info": {
            "title": "Pathway Research API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Research session lifecycle and checkpoint resume status.",
        },
        "paths": {
            "/healthz": {
                "get": {
                    "summary": "Health check",
                    "responses": {
                        "200": json_response("Service health", json!({
                            "type": "object",
                            "required": ["status", "service"],
                            "properties": {
                                "status": { "type": "string" },
                                "service": { "type": "string" },
                            },
                        })),
                    },
                },
            },
            "/research/checkpoint": {
                "get": {
                    "summary": "Whether a chat can resume from a checkpoint",
                    "security": [{ "bearer": [] }],
                    "parameters": [{ "$ref": "#/components/parameters/ChatIdQuery" }],
                    "responses": {
                        "200": json_response(
                            "Checkpoint status",
                            json!({ "$ref": "#/components/schemas/CheckpointStatus" }),
                        ),
                        "400": error_response("Missing or malformed chatId"),
                        "401": error_response("Unauthenticated"),
                        "500": error_response("Store failure"),
                    },
                },
            },
            "/research/sessions": {
                "post": {
                    "summary": "Get or create the session of a chat",
                    "security": [{ "bearer": [] }],
                    "requestBody": {
                        "required": true,
                        "content": {
                            "application/json": {
                                "schema": { "$ref": "#/components/schemas/StartSessionRequest" },
                            },
                        },
                    },
                    "responses": {
                        "200": json_response(
                            "Session",
                            json!({ "$ref": "#/components/schemas/ChatSession" }),
                        ),
                        "400": error_response("Invalid body"),
                        "401": error_response("Unauthenticated"),
                    },
                },
                "get": {
                    "summary": "List the caller's sessions, newest first",
                    "security": [{ "bearer": [] }],
                    "parameters": [
                        {
                            "name": "status",
                            "in": "query",
                            "schema": { "$ref": "#/components/schemas/SessionStatus" },
                        },
                        {
                            "name": "limit",
                            "in": "query",
                            "schema": { "type": "integer", "minimum": 1, "maximum": 100, "default": 20 },
                        },
                        {
                            "name": "offset",
                            "in": "query",
                            "schema": { "type": "integer", "minimum": 0, "default": 0 },
                        },
                    ],
                    "responses": {
                        "200": json_response("Sessions", json!({
                            "type": "object",
                            "required": ["sessions"],
                            "properties": {
                                "sessions": {
                                    "type": "array",
                                    "items": { "$ref": "#/components/schemas/ChatSession" },
                                },
                            },
                        })),
                        "400": error_response("Invalid query"),
                        "401": error_response("Unauthenticated"),
                    },
                },
            },
            "/research/messages": {
                "get": {
                    "summary": "Transcript of a chat's latest checkpoint",
                    "security": [{ "bearer": [] }],
                    "parameters": [{ "$ref": "#/components/parameters/ChatIdQuery" }],
                    "responses": {
                        "200": json_response("UI messages", json!({
                            "type": "object",
                            "required": ["messages"],
                            "properties": {
                                "messages": {
                                    "type": "array",
                                    "items": { "$ref": "#/components/schemas/UiMessage" },
                                },
                            },
                        })),
                        "400": error_response("Missing chatId"),
                        "401": error_response("Unauthenticated"),
                    },
                },
            },
        },
        "components": {
            "securitySchemes": {
                "bearer": { "type": "http", "scheme": "bearer" },
            },
            "parameters": {
                "ChatIdQuery": {
                    "name": "chatId",
                    "in": "query",
                    "required": true,
                    "schema": { "type": "string" },
                },
            },
            "schemas": {
                "Error": {
                    "type": "object",
                    "required": ["error"],
                    "properties": { "error": { "type": "string" } },
                },
                "SessionStatus": {
                    "type": "string",
                    "enum": ["active", "completed", "failed", "abandoned"],
                },
                "Session": {
                    "type": "object",
                    "required": ["id", "threadId", "status", "createdAt", "updatedAt"],
                    "properties": {
                        "id": { "type": "string" },
                        "threadId": { "type": "string" },
                        "status": { "$ref": "#/components/schemas/SessionStatus" },
                        "researchBrief": { "type": ["string", "null"] },
                        "createdAt": { "type": "string", "format": "date-time" },
                        "updatedAt": { "type": "string", "format": "date-time" },
                    },
                },
                "ChatSession": {
                    "allOf": [
                        { "$ref": "#/components/schemas/Session" },
                        {
                            "type": "object",
                            "required": ["chatId"],
                            "properties": { "chatId": { "type": "string" } },
                        },
                    ],
                },
                "StartSessionRequest": {
                    "type": "object",
                    "required": ["chatId"],
                    "properties": {
                        "chatId": { "type": "string" },
                        "researchBrief": { "type": "string" },
                    },
                },
                "CheckpointMetadata": {
                    "type": "object",
                    "required": ["checkpointId", "threadId", "step", "source", "next", "updatedAt"],
                    "properties": {
                        "checkpointId": { "type": "string" },
                        "threadId": { "type": "string" },
                        "step": { "type": "integer" },
                        "source": { "type": "string", "enum": ["input", "loop", "update", "fork"] },
                        "next": { "type": "array", "items": { "type": "string" } },
                        "pendingQuestion": { "type": "string" },
                        "error": { "type": "string" },
                        "updatedAt": { "type": "string", "format": "date-time" },
                    },
                },
                "CheckpointStatus": {
                    "type": "object",
                    "required": ["hasCheckpoint", "session"],
                    "properties": {
                        "hasCheckpoint": { "type": "boolean" },
                        "session": {
                            "oneOf": [
                                { "$ref": "#/components/schemas/Session" },
                                { "type": "null" },
                            ],
                        },
                        "checkpoint": {
                            "oneOf": [
                                { "$ref": "#/components/schemas/CheckpointMetadata" },
                                { "type": "null" },
                            ],
                        },
                    },
                },
                "UiMessage": {
                    "type": "object",
                    "required": ["id", "role", "parts", "metadata"],
                    "properties": {
                        "id": { "type": "string" },
                        "role": { "type": "string", "enum": ["user", "assistant", "tool"] },
                        "parts": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "required": ["type", "text"],
                                "properties": {
                                    "type": { "const": "text" },
                                    "text": { "type": "string" },
                                },
                            },
                        },
                        "metadata": { "type": "object" },
                    },
                },
            },
        },
    })
}
