pub mod annotated_frame_writer;
