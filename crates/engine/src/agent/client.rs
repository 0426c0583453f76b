// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatch of local client requests.

use super::Agent;
use std::time::Duration;
use swarm_core::AgentError;
use swarm_wire::{Request, Response, PROTOCOL_VERSION};

impl Agent {
    /// Answer one client request.
    ///
    /// `ReloadConfig` needs the configuration source, which only the daemon
    /// knows, so it is refused here.
    pub async fn handle_request(&self, request: Request) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::Hello { version } => {
                if version != PROTOCOL_VERSION {
                    tracing::warn!(client = version, agent = PROTOCOL_VERSION, "version mismatch");
                }
                Response::Hello { version: PROTOCOL_VERSION }
            }

            Request::Status => Response::Status { status: self.status() },

            Request::Shutdown => {
                self.shutdown().await;
                Response::ShuttingDown
            }

            Request::ReloadConfig => Response::error(AgentError::InvalidArgument(
                "configuration reload is handled by the daemon".to_string(),
            )),

            Request::MaintainCache { mode } => {
                Response::from_result(self.maintain_cache(mode).await, |summary| {
                    Response::Cache { summary }
                })
            }

            Request::OpenConnection { process_id, process_is_owner } => Response::from_result(
                self.manager.open_local(process_id, process_is_owner).await,
                |reply| Response::Connected { reply },
            ),

            Request::CloseConnection { handle } => {
                Response::from_result(self.manager.close(handle).await, |()| Response::Ok)
            }

            Request::SendMessage { handle, message } => {
                Response::from_result(self.router.send_message(handle, message), |()| Response::Ok)
            }

            Request::GetMessage { handle, timeout_ms } => {
                let timeout = Duration::from_millis(timeout_ms);
                Response::from_result(self.router.get_message(handle, timeout).await, |message| {
                    Response::Message { message }
                })
            }

            Request::AddChannel { handle, full_path, name } => Response::from_result(
                self.channels.add_channel(handle, &full_path, &name),
                |()| Response::Ok,
            ),

            Request::TestChannel { handle, name } => {
                Response::from_result(self.channels.test_channel(handle, &name), |present| {
                    Response::ChannelPresent { present }
                })
            }

            Request::OpenChannel { handle, name, flags } => Response::from_result(
                self.channels.open_channel(handle, &name, flags).await,
                |(channel, path)| Response::Channel { channel, path },
            ),

            Request::CloseChannel { handle, channel } => Response::from_result(
                self.channels.close_channel(handle, channel).await,
                |()| Response::Ok,
            ),

            Request::OpenJob { handle, job } => {
                Response::from_result(self.open_job(handle, job).await, |()| Response::Ok)
            }

            Request::BeginJobSpecification { handle, specs } => Response::from_result(
                self.begin_job_specification(handle, specs).await,
                |()| Response::Ok,
            ),

            Request::AddTask { handle, tasks } => {
                Response::from_result(self.add_tasks(handle, tasks), |()| Response::Ok)
            }

            Request::EndJobSpecification { handle } => Response::from_result(
                self.end_job_specification(handle).await,
                |()| Response::Ok,
            ),

            Request::CloseJob { handle } => {
                Response::from_result(self.close_job(handle).await, |()| Response::Ok)
            }
        }
    }
}
