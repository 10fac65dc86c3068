// Copyright 2019 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

/// Enum representing the *class* of a CoAP message code.
#[derive(Debug, Copy, Eq, PartialEq, Clone)]
pub enum MsgCodeClass {
    /// Class for methods
    Method = 0,

    /// Class for successful responses
    Success = 2,

    /// Class for client error responses
    ClientError = 4,

    /// Class for server error responses
    ServerError = 5,
}

impl MsgCodeClass {
    /// Tries to calculate the message code class from the given message code.
    pub fn try_from(x: u8) -> Option<MsgCodeClass> {
        match x {
            0 => Some(MsgCodeClass::Method),
            2 => Some(MsgCodeClass::Success),
            4 => Some(MsgCodeClass::ClientError),
            5 => Some(MsgCodeClass::ServerError),
            _ => None,
        }
    }

    /// Returns true if the given message code is in this message code class.
    pub fn contains(self, code: MsgCode) -> bool {
        let code_u8 = code as u8;

        code_u8 != 0 && (code_u8 >> 5) == self as u8
    }
}

/// Enum representing the subset of CoAP message codes observed by the
/// exchange core.
#[derive(Debug, Copy, Eq, PartialEq, Hash, Clone)]
pub enum MsgCode {
    /// Empty message code. Only used for ping requests, resets, and empty acknowledgements.
    Empty = 0x00,

    /// CoAP GET method.
    MethodGet = 0x01,

    /// CoAP POST method.
    MethodPost = 0x02,

    /// CoAP PUT method.
    MethodPut = 0x03,

    /// CoAP DELETE method.
    MethodDelete = 0x04,

    /// CoAP CREATED success code.
    SuccessCreated = 0x41,

    /// CoAP DELETED success code.
    SuccessDeleted = 0x42,

    /// CoAP VALID success code.
    SuccessValid = 0x43,

    /// CoAP CHANGED success code.
    SuccessChanged = 0x44,

    /// CoAP CONTENT success code.
    SuccessContent = 0x45,

    /// CoAP BAD_REQUEST client error.
    ClientErrorBadRequest = 0x80,

    /// CoAP UNAUTHORIZED client error.
    ClientErrorUnauthorized = 0x81,

    /// CoAP FORBIDDEN client error.
    ClientErrorForbidden = 0x83,

    /// CoAP NOT_FOUND client error.
    ClientErrorNotFound = 0x84,

    /// CoAP METHOD_NOT_ALLOWED client error.
    ClientErrorMethodNotAllowed = 0x85,

    /// CoAP INTERNAL_SERVER_ERROR server error.
    ServerErrorInternalServerError = 0xA0,

    /// CoAP NOT_IMPLEMENTED server error.
    ServerErrorNotImplemented = 0xA1,

    /// CoAP SERVICE_UNAVAILABLE server error.
    ServerErrorServiceUnavailable = 0xA3,

    /// CoAP GATEWAY_TIMEOUT server error.
    ServerErrorGatewayTimeout = 0xA4,
}

impl MsgCode {
    /// Returns true if this message code is the empty code (0.00).
    pub fn is_empty(self) -> bool {
        self == MsgCode::Empty
    }

    /// Returns true if this message code is a method code (0.01-0.31).
    pub fn is_method(self) -> bool {
        MsgCodeClass::Method.contains(self)
    }

    /// Returns true if this message code is a response code (2.xx/4.xx/5.xx).
    pub fn is_response(self) -> bool {
        MsgCodeClass::Success.contains(self)
            || MsgCodeClass::ClientError.contains(self)
            || MsgCodeClass::ServerError.contains(self)
    }

    /// Returns true if this message code is a client or server error response.
    pub fn is_error(self) -> bool {
        MsgCodeClass::ClientError.contains(self) || MsgCodeClass::ServerError.contains(self)
    }
}

impl Default for MsgCode {
    fn default() -> Self {
        MsgCode::Empty
    }
}
