mod detections;
mod events;
